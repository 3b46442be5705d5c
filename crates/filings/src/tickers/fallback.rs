/// Well-known CUSIPs, consulted before any remote lookup.
const KNOWN_TICKERS: &[(&str, &str)] = &[
    ("037833100", "AAPL"),
    ("594918104", "MSFT"),
    ("02079K305", "GOOGL"),
    ("02079K107", "GOOG"),
    ("023135106", "AMZN"),
    ("88160R101", "TSLA"),
    ("30303M102", "META"),
    ("67066G104", "NVDA"),
    ("084670702", "BRK.B"),
    ("084670108", "BRK.A"),
    ("46625H100", "JPM"),
    ("060505104", "BAC"),
    ("191216100", "KO"),
    ("025816109", "AXP"),
    ("166764100", "CVX"),
    ("674599105", "OXY"),
    ("615369105", "MCO"),
    ("500754106", "KHC"),
    ("H1467J104", "CB"),
    ("92826C839", "V"),
    ("57636Q104", "MA"),
    ("22160K105", "COST"),
    ("931142103", "WMT"),
    ("478160104", "JNJ"),
];

pub fn fallback_ticker(cusip: &str) -> Option<&'static str> {
    KNOWN_TICKERS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(cusip))
        .map(|(_, ticker)| *ticker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_cusips() {
        assert_eq!(fallback_ticker("037833100"), Some("AAPL"));
        assert_eq!(fallback_ticker("88160r101"), Some("TSLA"));
        assert_eq!(fallback_ticker("084670702"), Some("BRK.B"));
        assert_eq!(fallback_ticker("000000000"), None);
    }
}
