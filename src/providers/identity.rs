//! Receipt identity and amount checks.
//!
//! Receipts spell names and account numbers inconsistently and mask digits
//! at the provider's whim, so every comparison here is deliberately fuzzy:
//! containment for names, digit-suffix matching for accounts, a one-cent
//! tolerance for amounts.

use bigdecimal::BigDecimal;

use super::fields::{digits, is_masked};
use super::ParsedReceipt;
use crate::config::IdentityRules;

pub enum AmountCheck {
    Matched,
    Missing,
    Mismatch { actual: BigDecimal },
}

/// Runs the configured checks against a parsed receipt and returns the
/// failure reasons in check order. An empty vec means the receipt passed.
pub fn validate_identity(receipt: &ParsedReceipt, rules: &IdentityRules) -> Vec<String> {
    let mut reasons = Vec::new();

    if rules.check_name {
        if let Some(expected) = &rules.expected_name {
            match &receipt.receiver_name {
                Some(actual) if names_match(expected, actual) => {}
                Some(actual) => {
                    reasons.push(format!("receiver name '{}' does not match expected", actual))
                }
                None => reasons.push("receiver name missing from receipt".to_string()),
            }
        }
    }

    if rules.check_account {
        if let Some(expected) = &rules.expected_account {
            check_receiver_account(receipt, expected, &mut reasons);
        }
    }

    reasons
}

/// Account matching with masking leniency. A masked receiver that fails the
/// suffix check falls back to the payer column (some layouts swap the two);
/// if the payer column is absent too, the check passes rather than reject a
/// receipt the provider censored beyond recognition.
fn check_receiver_account(receipt: &ParsedReceipt, expected: &str, reasons: &mut Vec<String>) {
    let payer = receipt.payer_account.as_deref();

    match receipt.receiver_account.as_deref() {
        Some(actual) if accounts_match(expected, actual) => {}
        Some(actual) if is_masked(actual) => match payer {
            Some(p) if accounts_match(expected, p) => {}
            Some(_) => reasons.push("masked receiver account does not match expected".to_string()),
            None => {
                tracing::debug!("receiver account masked beyond comparison, accepting receipt");
            }
        },
        Some(actual) => reasons.push(format!(
            "receiver account '{}' does not match expected",
            actual
        )),
        None => match payer {
            Some(p) if accounts_match(expected, p) => {}
            _ => reasons.push("receiver account missing from receipt".to_string()),
        },
    }
}

pub fn check_amount(expected: &BigDecimal, actual: Option<&BigDecimal>) -> AmountCheck {
    match actual {
        None => AmountCheck::Missing,
        Some(actual) if amounts_match(expected, actual) => AmountCheck::Matched,
        Some(actual) => AmountCheck::Mismatch {
            actual: actual.clone(),
        },
    }
}

/// Receipts round to two decimals, so equality is within one cent.
pub fn amounts_match(a: &BigDecimal, b: &BigDecimal) -> bool {
    let tolerance: BigDecimal = "0.01".parse().expect("static decimal");
    (a - b).abs() <= tolerance
}

/// Case- and whitespace-insensitive containment either way, falling back to
/// the first two tokens to survive order-of-names differences.
pub fn names_match(expected: &str, actual: &str) -> bool {
    let e = normalize_name(expected);
    let a = normalize_name(actual);
    if e.is_empty() || a.is_empty() {
        return false;
    }
    if a.contains(&e) || e.contains(&a) {
        return true;
    }

    let e_head = first_tokens(&e, 2);
    let a_head = first_tokens(&a, 2);
    a.contains(&e_head) || e.contains(&a_head)
}

/// Exact digit match, or a shared 4-digit suffix to tolerate masking.
pub fn accounts_match(expected: &str, actual: &str) -> bool {
    let e = digits(expected);
    let a = digits(actual);
    if e.is_empty() || a.is_empty() {
        return false;
    }
    if e == a {
        return true;
    }
    e.len() >= 4 && a.len() >= 4 && tail(&e, 4) == tail(&a, 4)
}

fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn first_tokens(name: &str, count: usize) -> String {
    name.split_whitespace()
        .take(count)
        .collect::<Vec<_>>()
        .join(" ")
}

// Digit strings are ASCII, byte slicing is safe.
fn tail(s: &str, n: usize) -> &str {
    &s[s.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityRules;

    fn rules(name: &str, account: &str) -> IdentityRules {
        IdentityRules {
            check_name: true,
            check_account: true,
            expected_name: Some(name.to_string()),
            expected_account: Some(account.to_string()),
        }
    }

    fn receipt(name: Option<&str>, receiver: Option<&str>, payer: Option<&str>) -> ParsedReceipt {
        ParsedReceipt {
            receiver_name: name.map(str::to_string),
            receiver_account: receiver.map(str::to_string),
            payer_account: payer.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_names_match_case_and_whitespace() {
        assert!(names_match("Muday Wallet PLC", "MUDAY  WALLET   PLC"));
        assert!(names_match("MUDAY WALLET", "muday wallet plc"));
    }

    #[test]
    fn test_names_match_first_two_tokens() {
        assert!(names_match("MUDAY WALLET PLC", "MUDAY WALLET TRADING PLC"));
        assert!(!names_match("MUDAY WALLET PLC", "SELAM TRADING PLC"));
    }

    #[test]
    fn test_accounts_match_exact_and_suffix() {
        assert!(accounts_match("251911223344", "+251-911-223344"));
        assert!(accounts_match("1000012345678", "1000****5678"));
        assert!(!accounts_match("1000012345678", "1000****9999"));
        assert!(!accounts_match("", "1234"));
    }

    #[test]
    fn test_validate_passes_on_good_receipt() {
        let rules = rules("MUDAY WALLET PLC", "251911223344");
        let receipt = receipt(
            Some("MUDAY WALLET PLC"),
            Some("251911223344"),
            Some("0911000000"),
        );
        assert!(validate_identity(&receipt, &rules).is_empty());
    }

    #[test]
    fn test_validate_reports_name_mismatch() {
        let rules = rules("MUDAY WALLET PLC", "251911223344");
        let receipt = receipt(Some("SELAM TRADING"), Some("251911223344"), None);

        let reasons = validate_identity(&receipt, &rules);
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("receiver name"));
    }

    #[test]
    fn test_masked_receiver_without_payer_is_lenient() {
        let rules = rules("MUDAY WALLET PLC", "251911223344");
        // Mask hides all useful digits; no payer column to cross-check.
        let receipt = receipt(Some("MUDAY WALLET PLC"), Some("25****00"), None);
        assert!(validate_identity(&receipt, &rules).is_empty());
    }

    #[test]
    fn test_masked_receiver_with_failing_payer_is_rejected() {
        let rules = rules("MUDAY WALLET PLC", "251911223344");
        let receipt = receipt(
            Some("MUDAY WALLET PLC"),
            Some("25****00"),
            Some("0911999999"),
        );

        let reasons = validate_identity(&receipt, &rules);
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("masked receiver account"));
    }

    #[test]
    fn test_masked_receiver_with_matching_payer_passes() {
        let rules = rules("MUDAY WALLET PLC", "251911223344");
        // Swapped columns: the expected number sits in the payer cell.
        let receipt = receipt(Some("MUDAY WALLET PLC"), Some("25****00"), Some("251911223344"));
        assert!(validate_identity(&receipt, &rules).is_empty());
    }

    #[test]
    fn test_unmasked_mismatch_gets_no_leniency() {
        let rules = rules("MUDAY WALLET PLC", "251911223344");
        let receipt = receipt(Some("MUDAY WALLET PLC"), Some("0911999999"), None);

        let reasons = validate_identity(&receipt, &rules);
        assert_eq!(reasons.len(), 1);
    }

    #[test]
    fn test_disabled_checks_always_pass() {
        let mut rules = rules("MUDAY WALLET PLC", "251911223344");
        rules.check_name = false;
        rules.check_account = false;

        let receipt = receipt(Some("WRONG"), Some("0000"), None);
        assert!(validate_identity(&receipt, &rules).is_empty());
    }

    #[test]
    fn test_amount_check_tolerance() {
        let expected: BigDecimal = "100.00".parse().unwrap();

        assert!(matches!(
            check_amount(&expected, Some(&"100.00".parse().unwrap())),
            AmountCheck::Matched
        ));
        assert!(matches!(
            check_amount(&expected, Some(&"100.01".parse().unwrap())),
            AmountCheck::Matched
        ));
        assert!(matches!(
            check_amount(&expected, Some(&"99.99".parse().unwrap())),
            AmountCheck::Matched
        ));
        assert!(matches!(
            check_amount(&expected, Some(&"100.02".parse().unwrap())),
            AmountCheck::Mismatch { .. }
        ));
        assert!(matches!(check_amount(&expected, None), AmountCheck::Missing));
    }
}
