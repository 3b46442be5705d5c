//! EDGAR `informationTable` XML.
//!
//! Element names are matched on their local part, so both the default
//! namespace form (`<infoTable>`) and prefixed forms (`<ns1:infoTable>`)
//! are accepted.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{non_empty, parse_shares, parse_value, FilingParser};
use crate::errors::{ParseError, ParseErrorKind};
use crate::models::{FilingDocument, ParsedHolding, ValueUnit};

const ROOT: &str = "informationtable";
const ROW: &str = "infotable";

pub struct XmlInfoTableParser {
    unit: ValueUnit,
}

impl XmlInfoTableParser {
    pub fn new(unit: ValueUnit) -> Self {
        Self { unit }
    }
}

/// Fields collected for one `<infoTable>` element.
#[derive(Default)]
struct RowFields {
    start: u64,
    issuer: Option<String>,
    title_of_class: Option<String>,
    cusip: Option<String>,
    value: Option<String>,
    shares: Option<String>,
    put_call: Option<String>,
}

impl RowFields {
    fn set(&mut self, element: &str, text: String) {
        let slot = match element {
            "nameofissuer" => &mut self.issuer,
            "titleofclass" => &mut self.title_of_class,
            "cusip" => &mut self.cusip,
            "value" => &mut self.value,
            "sshprnamt" => &mut self.shares,
            "putcall" => &mut self.put_call,
            _ => return,
        };
        slot.get_or_insert_with(String::new).push_str(&text);
    }

    fn finish(self, unit: ValueUnit) -> Result<ParsedHolding, ParseError> {
        let start = self.start;
        let missing = |field: &str| {
            ParseError::new(
                ParseErrorKind::MissingField,
                format!("infoTable without {}", field),
            )
            .at(start)
        };

        let cusip = non_empty(self.cusip).ok_or_else(|| missing("cusip"))?;
        let issuer = non_empty(self.issuer).ok_or_else(|| missing("nameOfIssuer"))?;
        let value = non_empty(self.value).ok_or_else(|| missing("value"))?;
        let shares = non_empty(self.shares).ok_or_else(|| missing("sshPrnamt"))?;

        Ok(ParsedHolding {
            market_value: parse_value(&value, unit).map_err(|e| e.at(start))?,
            shares: parse_shares(&shares).map_err(|e| e.at(start))?,
            cusip: cusip.to_ascii_uppercase(),
            issuer,
            title_of_class: non_empty(self.title_of_class),
            put_call: non_empty(self.put_call),
        })
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

impl FilingParser for XmlInfoTableParser {
    fn id(&self) -> &'static str {
        "XML_INFO_TABLE"
    }

    fn parse(&self, document: &FilingDocument) -> Result<Vec<ParsedHolding>, ParseError> {
        let mut reader = Reader::from_reader(document.content.as_slice());
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut path: Vec<String> = Vec::new();
        let mut saw_root = false;
        let mut current: Option<RowFields> = None;
        let mut holdings = Vec::new();

        loop {
            let offset = reader.buffer_position() as u64;
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                let snippet = String::from_utf8_lossy(
                    &document.content[(offset as usize).min(document.content.len())..]
                        [..document.content.len().saturating_sub(offset as usize).min(80)],
                )
                .into_owned();
                ParseError::new(ParseErrorKind::Malformed, e.to_string())
                    .with_fragment(snippet)
                    .at(offset)
            })?;

            match event {
                Event::Start(element) => {
                    let name = local_name(element.local_name().as_ref());
                    if name == ROOT {
                        saw_root = true;
                    } else if name == ROW {
                        current = Some(RowFields {
                            start: offset,
                            ..RowFields::default()
                        });
                    }
                    path.push(name);
                }
                Event::End(_) => {
                    if path.pop().as_deref() == Some(ROW) {
                        if let Some(row) = current.take() {
                            holdings.push(row.finish(self.unit)?);
                        }
                    }
                }
                Event::Empty(element) => {
                    if local_name(element.local_name().as_ref()) == ROOT {
                        saw_root = true;
                    }
                }
                Event::Text(text) => {
                    if let (Some(row), Some(element)) = (current.as_mut(), path.last()) {
                        let text = text.unescape().map_err(|e| {
                            ParseError::new(ParseErrorKind::Malformed, e.to_string()).at(offset)
                        })?;
                        row.set(element, text.into_owned());
                    }
                }
                Event::CData(data) => {
                    if let (Some(row), Some(element)) = (current.as_mut(), path.last()) {
                        row.set(element, String::from_utf8_lossy(&data).into_owned());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(ParseError::new(
                ParseErrorKind::MissingTable,
                "document has no informationTable element",
            ));
        }
        if current.is_some() {
            return Err(ParseError::new(
                ParseErrorKind::Malformed,
                "document ends inside an infoTable element",
            ));
        }

        Ok(holdings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentFormat, DocumentMetadata, FilingPeriod};
    use rust_decimal_macros::dec;

    fn document(xml: &str) -> FilingDocument {
        FilingDocument::new(
            xml.as_bytes().to_vec(),
            DocumentMetadata {
                format: DocumentFormat::XmlInfoTable,
                content_type: Some("application/xml".to_string()),
                source_url: "https://www.sec.gov/Archives/edgar/data/1067983/x/46994.xml"
                    .to_string(),
                period: "2024Q1".parse::<FilingPeriod>().unwrap(),
                filing_date: None,
                accession_number: None,
                form_type: None,
            },
        )
    }

    const TWO_ROWS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ns1:informationTable xmlns:ns1="http://www.sec.gov/edgar/document/thirteenf/informationtable">
  <ns1:infoTable>
    <ns1:nameOfIssuer>APPLE INC</ns1:nameOfIssuer>
    <ns1:titleOfClass>COM</ns1:titleOfClass>
    <ns1:cusip>037833100</ns1:cusip>
    <ns1:value>600</ns1:value>
    <ns1:shrsOrPrnAmt>
      <ns1:sshPrnamt>3</ns1:sshPrnamt>
      <ns1:sshPrnamtType>SH</ns1:sshPrnamtType>
    </ns1:shrsOrPrnAmt>
    <ns1:investmentDiscretion>DFND</ns1:investmentDiscretion>
    <ns1:votingAuthority><ns1:Sole>3</ns1:Sole><ns1:Shared>0</ns1:Shared><ns1:None>0</ns1:None></ns1:votingAuthority>
  </ns1:infoTable>
  <ns1:infoTable>
    <ns1:nameOfIssuer>AT&amp;T INC</ns1:nameOfIssuer>
    <ns1:titleOfClass>COM</ns1:titleOfClass>
    <ns1:cusip>00206r102</ns1:cusip>
    <ns1:value>400</ns1:value>
    <ns1:shrsOrPrnAmt><ns1:sshPrnamt>20</ns1:sshPrnamt><ns1:sshPrnamtType>SH</ns1:sshPrnamtType></ns1:shrsOrPrnAmt>
    <ns1:putCall>Call</ns1:putCall>
  </ns1:infoTable>
</ns1:informationTable>"#;

    #[test]
    fn test_parses_rows_in_document_order() {
        let parser = XmlInfoTableParser::new(ValueUnit::Dollars);
        let holdings = parser.parse(&document(TWO_ROWS)).unwrap();

        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].issuer, "APPLE INC");
        assert_eq!(holdings[0].cusip, "037833100");
        assert_eq!(holdings[0].title_of_class.as_deref(), Some("COM"));
        assert_eq!(holdings[0].shares, 3);
        assert_eq!(holdings[0].market_value, dec!(600));
        assert!(!holdings[0].is_option());

        assert_eq!(holdings[1].issuer, "AT&T INC");
        assert_eq!(holdings[1].cusip, "00206R102");
        assert!(holdings[1].is_option());
    }

    #[test]
    fn test_thousands_are_scaled_to_dollars() {
        let parser = XmlInfoTableParser::new(ValueUnit::Thousands);
        let holdings = parser.parse(&document(TWO_ROWS)).unwrap();
        assert_eq!(holdings[0].market_value, dec!(600000));
    }

    #[test]
    fn test_unprefixed_elements() {
        let xml = r#"<informationTable xmlns="http://www.sec.gov/edgar/document/thirteenf/informationtable">
            <infoTable><nameOfIssuer>TESLA INC</nameOfIssuer><cusip>88160R101</cusip><value>400</value>
            <shrsOrPrnAmt><sshPrnamt>2</sshPrnamt></shrsOrPrnAmt></infoTable>
        </informationTable>"#;
        let holdings = XmlInfoTableParser::new(ValueUnit::Dollars)
            .parse(&document(xml))
            .unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].issuer, "TESLA INC");
    }

    #[test]
    fn test_empty_table_is_valid() {
        let holdings = XmlInfoTableParser::new(ValueUnit::Dollars)
            .parse(&document("<informationTable></informationTable>"))
            .unwrap();
        assert!(holdings.is_empty());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let error = XmlInfoTableParser::new(ValueUnit::Dollars)
            .parse(&document("<edgarSubmission><headerData/></edgarSubmission>"))
            .unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::MissingTable);
    }

    #[test]
    fn test_missing_cusip_reports_offset() {
        let xml = "<informationTable><infoTable><nameOfIssuer>X</nameOfIssuer><value>1</value><sshPrnamt>1</sshPrnamt></infoTable></informationTable>";
        let error = XmlInfoTableParser::new(ValueUnit::Dollars)
            .parse(&document(xml))
            .unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::MissingField);
        assert!(error.message.contains("cusip"));
        assert_eq!(error.offset, Some(18));
    }

    #[test]
    fn test_invalid_value() {
        let xml = "<informationTable><infoTable><nameOfIssuer>X</nameOfIssuer><cusip>123456789</cusip><value>abc</value><sshPrnamt>1</sshPrnamt></infoTable></informationTable>";
        let error = XmlInfoTableParser::new(ValueUnit::Dollars)
            .parse(&document(xml))
            .unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::InvalidNumber);
        assert_eq!(error.fragment.as_deref(), Some("abc"));
    }

    #[test]
    fn test_malformed_xml() {
        let xml = "<informationTable><infoTable><cusip>1</value></infoTable>";
        let error = XmlInfoTableParser::new(ValueUnit::Dollars)
            .parse(&document(xml))
            .unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::Malformed);
        assert!(error.offset.is_some());
    }
}
