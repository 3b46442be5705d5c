//! Tab-separated `INFOTABLE.tsv` rows from the SEC structured 13F data sets.

use csv::{ReaderBuilder, StringRecord};

use super::{non_empty, parse_shares, parse_value, FilingParser};
use crate::errors::{ParseError, ParseErrorKind};
use crate::models::{FilingDocument, ParsedHolding, ValueUnit};

pub struct TsvInfoTableParser {
    unit: ValueUnit,
}

impl TsvInfoTableParser {
    pub fn new(unit: ValueUnit) -> Self {
        Self { unit }
    }
}

struct Columns {
    issuer: usize,
    title_of_class: Option<usize>,
    cusip: usize,
    value: usize,
    shares: usize,
    put_call: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, ParseError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::MissingTable,
                    format!("header has no {} column", name),
                )
                .with_fragment(headers.iter().collect::<Vec<_>>().join("\t"))
                .at(0)
            })
        };

        Ok(Self {
            issuer: require("NAMEOFISSUER")?,
            title_of_class: find("TITLEOFCLASS"),
            cusip: require("CUSIP")?,
            value: require("VALUE")?,
            shares: require("SSHPRNAMT")?,
            put_call: find("PUTCALL"),
        })
    }
}

impl FilingParser for TsvInfoTableParser {
    fn id(&self) -> &'static str {
        "TSV_INFO_TABLE"
    }

    fn parse(&self, document: &FilingDocument) -> Result<Vec<ParsedHolding>, ParseError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .quoting(false)
            .from_reader(document.content.as_slice());

        let headers = reader.headers().map_err(|e| {
            ParseError::new(ParseErrorKind::Malformed, e.to_string()).at(0)
        })?;
        let columns = Columns::from_headers(headers)?;

        let mut holdings = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                let offset = e.position().map(|p| p.byte()).unwrap_or(0);
                ParseError::new(ParseErrorKind::Malformed, e.to_string()).at(offset)
            })?;
            let offset = record.position().map(|p| p.byte()).unwrap_or(0);
            let cell = |index: usize| non_empty(record.get(index).map(str::to_string));
            let missing = |field: &str| {
                ParseError::new(ParseErrorKind::MissingField, format!("row without {}", field))
                    .with_fragment(record.iter().collect::<Vec<_>>().join("\t"))
                    .at(offset)
            };

            let cusip = cell(columns.cusip).ok_or_else(|| missing("CUSIP"))?;
            let issuer = cell(columns.issuer).ok_or_else(|| missing("NAMEOFISSUER"))?;
            let value = cell(columns.value).ok_or_else(|| missing("VALUE"))?;
            let shares = cell(columns.shares).ok_or_else(|| missing("SSHPRNAMT"))?;

            holdings.push(ParsedHolding {
                cusip: cusip.to_ascii_uppercase(),
                issuer,
                title_of_class: columns.title_of_class.and_then(cell),
                shares: parse_shares(&shares).map_err(|e| e.at(offset))?,
                market_value: parse_value(&value, self.unit).map_err(|e| e.at(offset))?,
                put_call: columns.put_call.and_then(cell),
            });
        }

        Ok(holdings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentFormat, DocumentMetadata, FilingPeriod};
    use rust_decimal_macros::dec;

    fn document(tsv: &str) -> FilingDocument {
        FilingDocument::new(
            tsv.as_bytes().to_vec(),
            DocumentMetadata {
                format: DocumentFormat::TsvInfoTable,
                content_type: Some("text/tab-separated-values".to_string()),
                source_url: "file:///INFOTABLE.tsv".to_string(),
                period: "2024Q1".parse::<FilingPeriod>().unwrap(),
                filing_date: None,
                accession_number: None,
                form_type: None,
            },
        )
    }

    const HEADER: &str = "ACCESSION_NUMBER\tINFOTABLE_SK\tNAMEOFISSUER\tTITLEOFCLASS\tCUSIP\tFIGI\tVALUE\tSSHPRNAMT\tSSHPRNAMTTYPE\tPUTCALL\n";

    #[test]
    fn test_parses_data_set_rows() {
        let tsv = format!(
            "{}{}{}",
            HEADER,
            "0000950123-24-004444\t1\tAPPLE INC\tCOM\t037833100\t\t600\t3\tSH\t\n",
            "0000950123-24-004444\t2\tTESLA INC\tCOM\t88160r101\t\t400\t2\tSH\tPut\n",
        );
        let holdings = TsvInfoTableParser::new(ValueUnit::Dollars)
            .parse(&document(&tsv))
            .unwrap();

        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].issuer, "APPLE INC");
        assert_eq!(holdings[0].market_value, dec!(600));
        assert_eq!(holdings[0].put_call, None);
        assert_eq!(holdings[1].cusip, "88160R101");
        assert!(holdings[1].is_option());
    }

    #[test]
    fn test_missing_required_column() {
        let tsv = "NAMEOFISSUER\tCUSIP\tSSHPRNAMT\nAPPLE INC\t037833100\t3\n";
        let error = TsvInfoTableParser::new(ValueUnit::Dollars)
            .parse(&document(tsv))
            .unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::MissingTable);
        assert!(error.message.contains("VALUE"));
    }

    #[test]
    fn test_missing_cell_reports_row_offset() {
        let tsv = format!(
            "{}{}",
            HEADER, "0000950123-24-004444\t1\tAPPLE INC\tCOM\t\t\t600\t3\tSH\t\n"
        );
        let error = TsvInfoTableParser::new(ValueUnit::Dollars)
            .parse(&document(&tsv))
            .unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::MissingField);
        assert_eq!(error.offset, Some(HEADER.len() as u64));
    }
}
