//! Shared helpers for pulling typed values out of scraped receipt fields.

use bigdecimal::BigDecimal;
use std::collections::BTreeMap;

/// Looks a value up by alias, in alias priority order. Keys in the map are
/// expected to be lowercased already; matching is by containment so that
/// label variants like "transferred amount" and "amount in birr" both
/// resolve through the "amount" alias.
pub fn resolve<'a>(map: &'a BTreeMap<String, String>, aliases: &[&str]) -> Option<&'a str> {
    for alias in aliases {
        for (key, value) in map {
            if key.contains(alias) && !value.trim().is_empty() {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Parses "1,234.56 Birr", "ETB 1000.00" and friends. Strips everything
/// except digits, the decimal point and a leading minus.
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

/// Keeps only the digits of a phone number or account id.
pub fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Providers mask account numbers and phones with asterisks.
pub fn is_masked(raw: &str) -> bool {
    raw.contains('*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_prefers_alias_order() {
        let map = map_of(&[
            ("settled amount", "90.00"),
            ("transferred amount", "100.00"),
        ]);
        let value = resolve(&map, &["transferred amount", "amount"]);
        assert_eq!(value, Some("100.00"));
    }

    #[test]
    fn test_resolve_matches_by_containment() {
        let map = map_of(&[("total amount in birr", "1,000.00")]);
        assert_eq!(resolve(&map, &["amount"]), Some("1,000.00"));
    }

    #[test]
    fn test_resolve_skips_empty_values() {
        let map = map_of(&[("amount", "  "), ("total amount", "55.00")]);
        assert_eq!(resolve(&map, &["amount"]), Some("55.00"));
    }

    #[test]
    fn test_parse_decimal_currency_noise() {
        assert_eq!(parse_decimal("1,000.00 Birr"), Some("1000.00".parse().unwrap()));
        assert_eq!(parse_decimal("ETB 25.50"), Some("25.50".parse().unwrap()));
        assert_eq!(parse_decimal("-12.30"), Some("-12.30".parse().unwrap()));
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal(""), None);
    }

    #[test]
    fn test_digits() {
        assert_eq!(digits("+251-911-223344"), "251911223344");
        assert_eq!(digits("1000****5678"), "10005678");
    }

    #[test]
    fn test_is_masked() {
        assert!(is_masked("2519****3344"));
        assert!(!is_masked("251911223344"));
    }
}
