use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod cbe;
pub mod fields;
pub mod identity;
pub mod reference;
pub mod telebirr;

pub use cbe::CbeClient;
pub use telebirr::TelebirrClient;

/// Payment providers whose receipts we can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Cbe,
    Telebirr,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Cbe => "cbe",
            Provider::Telebirr => "telebirr",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cbe" => Ok(Provider::Cbe),
            "telebirr" => Ok(Provider::Telebirr),
            other => Err(format!("unknown payment provider: {}", other)),
        }
    }
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("transaction not found at provider")]
    NotFound,

    #[error("receipt could not be parsed: {0}")]
    ParseFailed(String),

    #[error("provider unreachable: {0}")]
    Transport(String),

    #[error("receipt failed validation: {}", reasons.join("; "))]
    IdentityMismatch { reasons: Vec<String> },

    #[error("Amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch {
        expected: BigDecimal,
        actual: BigDecimal,
    },
}

impl From<reqwest::Error> for VerifyError {
    fn from(err: reqwest::Error) -> Self {
        VerifyError::Transport(err.to_string())
    }
}

/// Fields scraped out of a provider receipt. Every field is optional; a
/// receipt with gaps is still returned and judged by the identity checks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedReceipt {
    pub reference: Option<String>,
    pub payer_name: Option<String>,
    pub payer_account: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_account: Option<String>,
    pub amount: Option<BigDecimal>,
    pub service_fee: Option<BigDecimal>,
    pub vat: Option<BigDecimal>,
    pub total_paid: Option<BigDecimal>,
    pub status: Option<String>,
    pub date: Option<String>,
    pub reason: Option<String>,
}

impl ParsedReceipt {
    /// True when the scrape produced nothing usable at all.
    pub fn is_empty(&self) -> bool {
        self.reference.is_none()
            && self.payer_name.is_none()
            && self.receiver_name.is_none()
            && self.receiver_account.is_none()
            && self.amount.is_none()
            && self.total_paid.is_none()
    }
}

/// Outcome of a successful verification, persisted alongside the ledger row.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub success: bool,
    pub provider: Provider,
    /// Canonical reference the receipt was verified under.
    pub transaction_id: String,
    pub amount: Option<BigDecimal>,
    pub currency: String,
    pub status: String,
    pub message: String,
    /// Parsed receipt payload, kept for audit.
    pub raw: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip() {
        assert_eq!("cbe".parse::<Provider>().unwrap(), Provider::Cbe);
        assert_eq!("Telebirr".parse::<Provider>().unwrap(), Provider::Telebirr);
        assert_eq!(Provider::Cbe.as_str(), "cbe");
        assert!("mpesa".parse::<Provider>().is_err());
    }

    #[test]
    fn test_empty_receipt_detection() {
        assert!(ParsedReceipt::default().is_empty());

        let receipt = ParsedReceipt {
            amount: Some(BigDecimal::from(100)),
            ..Default::default()
        };
        assert!(!receipt.is_empty());
    }

    #[test]
    fn test_amount_mismatch_message_format() {
        let err = VerifyError::AmountMismatch {
            expected: BigDecimal::from(100),
            actual: BigDecimal::from(50),
        };
        assert_eq!(err.to_string(), "Amount mismatch: expected 100, got 50");
    }
}
