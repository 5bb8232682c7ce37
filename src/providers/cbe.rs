//! Commercial Bank of Ethiopia receipt acquisition and parsing.
//!
//! CBE serves transfer receipts as PDF documents keyed by the FT reference
//! plus the last digits of the receiving account. The PDF is text-extracted
//! and scanned as labeled lines; extractors differ on whether a value lands
//! on the label's own line or the next one, so both layouts are handled.

use regex::Regex;
use reqwest::Client;
use std::time::Duration;

use super::fields;
use super::{ParsedReceipt, VerifyError};

/// CBE can take most of a minute to render a receipt.
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct CbeClient {
    client: Client,
    verify_url: String,
    account_suffix: String,
}

impl CbeClient {
    pub fn new(verify_url: String, account_suffix: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        CbeClient {
            client,
            verify_url,
            account_suffix,
        }
    }

    /// Downloads the receipt PDF for a canonical reference. A 404 or a body
    /// that is not a PDF both mean the transaction does not exist.
    pub async fn fetch_receipt(&self, reference: &str) -> Result<Vec<u8>, VerifyError> {
        let url = format!(
            "{}/?id={}{}",
            self.verify_url.trim_end_matches('/'),
            reference,
            self.account_suffix
        );

        let response = self.client.get(&url).send().await?;

        if response.status() == 404 {
            return Err(VerifyError::NotFound);
        }
        if !response.status().is_success() {
            return Err(VerifyError::Transport(format!(
                "receipt endpoint returned status {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?.to_vec();
        if !bytes.starts_with(b"%PDF") {
            return Err(VerifyError::NotFound);
        }
        Ok(bytes)
    }

    /// Fetches and parses the receipt in one step.
    pub async fn fetch_parsed(&self, reference: &str) -> Result<ParsedReceipt, VerifyError> {
        let bytes = self.fetch_receipt(reference).await?;
        let text = extract_text(&bytes)?;
        Ok(parse_receipt_text(&text))
    }
}

fn extract_text(bytes: &[u8]) -> Result<String, VerifyError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| VerifyError::ParseFailed(format!("pdf text extraction failed: {}", e)))
}

/// Label prefixes in match priority order; longer variants come first so
/// "total amount debited" never resolves through the bare "account" label.
const LABELS: &[(&str, &str)] = &[
    ("reason / type of service", "reason"),
    ("reason/type of service", "reason"),
    ("payment date & time", "date"),
    ("payment date", "date"),
    ("reference no. (vat invoice no)", "reference"),
    ("reference no", "reference"),
    ("transferred amount", "amount"),
    ("transfered amount", "amount"),
    ("commission or service charge", "fee"),
    ("service charge", "fee"),
    ("15% vat on commission", "vat"),
    ("15% vat", "vat"),
    ("total amount debited from customers account", "total"),
    ("total amount debited", "total"),
    ("receiver", "receiver"),
    ("payer", "payer"),
    ("account", "account"),
];

/// Scans extracted PDF text line by line. Missing fields stay None; the
/// function never fails on odd layouts, it just returns what it found.
pub fn parse_receipt_text(text: &str) -> ParsedReceipt {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut receipt = ParsedReceipt::default();
    let mut accounts: Vec<String> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        if let Some((key, mut value)) = split_labeled(lines[i]) {
            // Some extractors put the value on the following line.
            if value.is_empty() && i + 1 < lines.len() && split_labeled(lines[i + 1]).is_none() {
                value = lines[i + 1].to_string();
                i += 1;
            }
            apply_field(&mut receipt, &mut accounts, key, &value);
        }
        i += 1;
    }

    // Account lines appear in payer-then-receiver order.
    if let Some(first) = accounts.first() {
        receipt.payer_account = Some(first.clone());
    }
    if let Some(second) = accounts.get(1) {
        receipt.receiver_account = Some(second.clone());
    }

    receipt
}

fn split_labeled(line: &str) -> Option<(&'static str, String)> {
    for (prefix, key) in LABELS {
        if let Some(head) = line.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                let value = line[prefix.len()..]
                    .trim()
                    .trim_start_matches([':', '.', '-'])
                    .trim()
                    .to_string();
                return Some((key, value));
            }
        }
    }
    None
}

fn apply_field(receipt: &mut ParsedReceipt, accounts: &mut Vec<String>, key: &str, value: &str) {
    match key {
        "payer" => set_if_empty(&mut receipt.payer_name, value),
        "receiver" => set_if_empty(&mut receipt.receiver_name, value),
        "account" => {
            if !value.is_empty() {
                accounts.push(value.to_string());
            }
        }
        "amount" => {
            if receipt.amount.is_none() {
                receipt.amount = fields::parse_decimal(value);
            }
        }
        "fee" => {
            if receipt.service_fee.is_none() {
                receipt.service_fee = fields::parse_decimal(value);
            }
        }
        "vat" => {
            if receipt.vat.is_none() {
                receipt.vat = fields::parse_decimal(value);
            }
        }
        "total" => {
            if receipt.total_paid.is_none() {
                receipt.total_paid = fields::parse_decimal(value);
            }
        }
        "date" => set_if_empty(&mut receipt.date, value),
        "reason" => set_if_empty(&mut receipt.reason, value),
        "reference" => {
            if receipt.reference.is_none() {
                receipt.reference = extract_reference(value);
            }
        }
        _ => {}
    }
}

fn set_if_empty(slot: &mut Option<String>, value: &str) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

/// The reference cell carries extra words ("(VAT Invoice No)"); pull the FT
/// id out rather than trusting the raw remainder.
fn extract_reference(value: &str) -> Option<String> {
    let re = Regex::new(r"(?i)\bFT[A-Z0-9]{10,18}").expect("static regex");
    match re.find(value) {
        Some(found) => Some(found.as_str().to_uppercase()),
        None if !value.is_empty() => Some(value.to_uppercase()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECEIPT_TEXT: &str = r#"
        Commercial Bank of Ethiopia
        The Bank You can always Rely on!

        Payer ABEBE KEBEDE TESFAYE
        Account 1000****1234
        Receiver MUDAY WALLET PLC
        Account 1000****5678
        Payment Date & Time 6/15/2025, 2:30:00 PM
        Reference No. (VAT Invoice No) FT25301S1PV5083797
        Reason / Type of service Wallet top up
        Transferred Amount 1,000.00 ETB
        Commission or Service Charge 0.00 ETB
        15% VAT on Commission 0.00 ETB
        Total amount debited from customers account 1,000.00 ETB
    "#;

    #[test]
    fn test_parse_full_receipt() {
        let receipt = parse_receipt_text(RECEIPT_TEXT);

        assert_eq!(receipt.payer_name.as_deref(), Some("ABEBE KEBEDE TESFAYE"));
        assert_eq!(receipt.payer_account.as_deref(), Some("1000****1234"));
        assert_eq!(receipt.receiver_name.as_deref(), Some("MUDAY WALLET PLC"));
        assert_eq!(receipt.receiver_account.as_deref(), Some("1000****5678"));
        assert_eq!(receipt.reference.as_deref(), Some("FT25301S1PV5083797"));
        assert_eq!(receipt.amount, Some("1000.00".parse().unwrap()));
        assert_eq!(receipt.service_fee, Some("0.00".parse().unwrap()));
        assert_eq!(receipt.vat, Some("0.00".parse().unwrap()));
        assert_eq!(receipt.total_paid, Some("1000.00".parse().unwrap()));
        assert_eq!(receipt.reason.as_deref(), Some("Wallet top up"));
        assert!(receipt.date.is_some());
    }

    #[test]
    fn test_parse_value_on_next_line() {
        let text = "Payer\nALMAZ BEKELE\nAccount\n1000****9999\nTransferred Amount\n250.00 ETB";
        let receipt = parse_receipt_text(text);

        assert_eq!(receipt.payer_name.as_deref(), Some("ALMAZ BEKELE"));
        assert_eq!(receipt.payer_account.as_deref(), Some("1000****9999"));
        assert_eq!(receipt.amount, Some("250.00".parse().unwrap()));
    }

    #[test]
    fn test_parse_partial_receipt_keeps_missing_fields_none() {
        let text = "Receiver MUDAY WALLET PLC\nTransferred Amount 55.00 ETB";
        let receipt = parse_receipt_text(text);

        assert_eq!(receipt.receiver_name.as_deref(), Some("MUDAY WALLET PLC"));
        assert_eq!(receipt.amount, Some("55.00".parse().unwrap()));
        assert!(receipt.payer_name.is_none());
        assert!(receipt.receiver_account.is_none());
        assert!(receipt.reference.is_none());
    }

    #[test]
    fn test_parse_unrelated_text_yields_empty_receipt() {
        let receipt = parse_receipt_text("404 page not found\nplease try again later");
        assert!(receipt.is_empty());
    }

    #[test]
    fn test_single_account_line_is_payer_only() {
        let text = "Payer ABEBE\nAccount 1000****1234";
        let receipt = parse_receipt_text(text);

        assert_eq!(receipt.payer_account.as_deref(), Some("1000****1234"));
        assert!(receipt.receiver_account.is_none());
    }
}
