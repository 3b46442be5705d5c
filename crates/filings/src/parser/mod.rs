//! Information-table parsers.
//!
//! The parser for a document is chosen by [`select_parser`] from the
//! document's metadata alone, never from who filed it.

mod tsv;
mod xml;

pub use tsv::TsvInfoTableParser;
pub use xml::XmlInfoTableParser;

use rust_decimal::Decimal;

use crate::errors::{ParseError, ParseErrorKind};
use crate::models::{DocumentFormat, DocumentMetadata, FilingDocument, ParsedHolding, ValueUnit};

/// Turns a raw filing document into holding rows in document order.
pub trait FilingParser: Send + Sync {
    fn id(&self) -> &'static str;

    fn parse(&self, document: &FilingDocument) -> Result<Vec<ParsedHolding>, ParseError>;
}

/// Picks the parser variant for a document.
pub fn select_parser(metadata: &DocumentMetadata) -> Result<Box<dyn FilingParser>, ParseError> {
    let unit = metadata.value_unit();
    match metadata.format {
        DocumentFormat::XmlInfoTable => Ok(Box::new(XmlInfoTableParser::new(unit))),
        DocumentFormat::TsvInfoTable => Ok(Box::new(TsvInfoTableParser::new(unit))),
        DocumentFormat::Html => Err(ParseError::new(
            ParseErrorKind::UnsupportedFormat,
            format!("{} is an HTML page, not an information table", metadata.source_url),
        )),
        DocumentFormat::Unknown => Err(ParseError::new(
            ParseErrorKind::UnsupportedFormat,
            format!(
                "Unrecognized document format (content type {:?}) at {}",
                metadata.content_type, metadata.source_url
            ),
        )),
    }
}

/// Reads a `value` cell and converts it to dollars.
pub(crate) fn parse_value(raw: &str, unit: ValueUnit) -> Result<Decimal, ParseError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let value: Decimal = cleaned.parse().map_err(|_| {
        ParseError::new(ParseErrorKind::InvalidNumber, "value is not a number").with_fragment(raw)
    })?;
    if value.is_sign_negative() {
        return Err(
            ParseError::new(ParseErrorKind::InvalidNumber, "value is negative").with_fragment(raw),
        );
    }
    Ok(match unit {
        ValueUnit::Thousands => value * Decimal::ONE_THOUSAND,
        ValueUnit::Dollars => value,
    })
}

/// Reads an `sshPrnamt` cell. Fractional amounts are truncated.
pub(crate) fn parse_shares(raw: &str) -> Result<i64, ParseError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| {
            cleaned
                .parse::<Decimal>()
                .ok()
                .and_then(|d| i64::try_from(d.trunc()).ok())
        })
        .filter(|shares| *shares >= 0)
        .ok_or_else(|| {
            ParseError::new(ParseErrorKind::InvalidNumber, "share amount is not a number")
                .with_fragment(raw)
        })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilingPeriod;
    use rust_decimal_macros::dec;

    fn metadata(format: DocumentFormat) -> DocumentMetadata {
        DocumentMetadata {
            format,
            content_type: None,
            source_url: "https://www.sec.gov/Archives/edgar/data/1067983/x/46994.xml".to_string(),
            period: "2024Q1".parse::<FilingPeriod>().unwrap(),
            filing_date: None,
            accession_number: None,
            form_type: None,
        }
    }

    #[test]
    fn test_select_parser_by_format() {
        assert_eq!(
            select_parser(&metadata(DocumentFormat::XmlInfoTable)).unwrap().id(),
            "XML_INFO_TABLE"
        );
        assert_eq!(
            select_parser(&metadata(DocumentFormat::TsvInfoTable)).unwrap().id(),
            "TSV_INFO_TABLE"
        );
    }

    #[test]
    fn test_select_parser_rejects_unknown_formats() {
        for format in [DocumentFormat::Html, DocumentFormat::Unknown] {
            let error = select_parser(&metadata(format)).err().unwrap();
            assert_eq!(error.kind, ParseErrorKind::UnsupportedFormat);
        }
    }

    #[test]
    fn test_parse_value_units() {
        assert_eq!(parse_value("1,234", ValueUnit::Dollars).unwrap(), dec!(1234));
        assert_eq!(parse_value(" 600 ", ValueUnit::Thousands).unwrap(), dec!(600000));
        assert!(parse_value("n/a", ValueUnit::Dollars).is_err());
        assert!(parse_value("-5", ValueUnit::Dollars).is_err());
    }

    #[test]
    fn test_parse_shares() {
        assert_eq!(parse_shares("915,560,382").unwrap(), 915_560_382);
        assert_eq!(parse_shares("100.75").unwrap(), 100);
        assert!(parse_shares("lots").is_err());
        assert!(parse_shares("-1").is_err());
    }
}
