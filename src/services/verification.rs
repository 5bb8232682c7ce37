//! Verification orchestrator: normalize the reference, acquire the receipt
//! from the right provider, then judge the parsed fields against the
//! configured identity rules and the caller's expected amount.

use bigdecimal::BigDecimal;
use serde_json::json;

use crate::config::{CbeConfig, Config, IdentityRules, TelebirrConfig};
use crate::providers::identity::{self, AmountCheck};
use crate::providers::reference;
use crate::providers::{
    CbeClient, ParsedReceipt, Provider, TelebirrClient, VerificationResult, VerifyError,
};

pub struct VerificationService {
    cbe: CbeClient,
    telebirr: TelebirrClient,
    cbe_rules: IdentityRules,
    telebirr_rules: IdentityRules,
    simulate: bool,
}

impl VerificationService {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.cbe,
            &config.telebirr,
            config.simulate_verification,
        )
    }

    pub fn new(cbe: &CbeConfig, telebirr: &TelebirrConfig, simulate: bool) -> Self {
        VerificationService {
            cbe: CbeClient::new(cbe.verify_url.clone(), cbe.account_suffix.clone()),
            telebirr: TelebirrClient::new(telebirr.receipt_url.clone()),
            cbe_rules: cbe.identity.clone(),
            telebirr_rules: telebirr.identity.clone(),
            simulate,
        }
    }

    /// Canonical form of a raw reference for this provider.
    pub fn canonical_reference(&self, provider: Provider, raw: &str) -> String {
        reference::normalize(provider, raw)
    }

    /// Verifies a payment reference. `expected_amount` is compared against
    /// the receipt amount when given; pass None to accept whatever the
    /// receipt says (the receipt stays the authoritative amount source
    /// either way).
    pub async fn verify(
        &self,
        provider: Provider,
        raw_reference: &str,
        expected_amount: Option<&BigDecimal>,
    ) -> Result<VerificationResult, VerifyError> {
        let canonical = reference::normalize(provider, raw_reference);
        if canonical.is_empty() {
            return Err(VerifyError::ParseFailed(
                "payment reference is empty".to_string(),
            ));
        }

        if self.simulate {
            tracing::warn!(
                "Simulated verification for {} reference {}",
                provider,
                canonical
            );
            return Ok(simulated_result(provider, &canonical, expected_amount));
        }

        let receipt = match provider {
            Provider::Cbe => self.cbe.fetch_parsed(&canonical).await?,
            Provider::Telebirr => self.telebirr.fetch_parsed(&canonical).await?,
        };

        if receipt.is_empty() {
            return Err(VerifyError::ParseFailed(
                "no recognizable fields in receipt".to_string(),
            ));
        }

        let rules = match provider {
            Provider::Cbe => &self.cbe_rules,
            Provider::Telebirr => &self.telebirr_rules,
        };

        judge_receipt(provider, &canonical, receipt, rules, expected_amount)
    }
}

fn judge_receipt(
    provider: Provider,
    canonical: &str,
    receipt: ParsedReceipt,
    rules: &IdentityRules,
    expected_amount: Option<&BigDecimal>,
) -> Result<VerificationResult, VerifyError> {
    let mut reasons = identity::validate_identity(&receipt, rules);

    if let Some(status) = &receipt.status {
        if !status_is_settled(status) {
            reasons.push(format!("receipt status is '{}'", status));
        }
    }

    let receipt_amount = receipt.amount.as_ref().or(receipt.total_paid.as_ref());
    let amount_check =
        expected_amount.map(|expected| identity::check_amount(expected, receipt_amount));

    match amount_check {
        Some(AmountCheck::Mismatch { actual }) if reasons.is_empty() => {
            return Err(VerifyError::AmountMismatch {
                expected: expected_amount.cloned().unwrap_or_default(),
                actual,
            });
        }
        Some(AmountCheck::Mismatch { actual }) => {
            reasons.push(format!(
                "amount {} does not match expected {}",
                actual,
                expected_amount.cloned().unwrap_or_default()
            ));
        }
        Some(AmountCheck::Missing) => {
            reasons.push("amount missing from receipt".to_string());
        }
        Some(AmountCheck::Matched) | None => {}
    }

    if !reasons.is_empty() {
        return Err(VerifyError::IdentityMismatch { reasons });
    }

    let amount = receipt_amount.cloned();
    let status = receipt
        .status
        .clone()
        .unwrap_or_else(|| "completed".to_string());
    let raw = serde_json::to_value(&receipt).unwrap_or_else(|_| json!({}));

    Ok(VerificationResult {
        success: true,
        provider,
        transaction_id: canonical.to_string(),
        amount,
        currency: "ETB".to_string(),
        status,
        message: "receipt verified".to_string(),
        raw,
    })
}

fn status_is_settled(status: &str) -> bool {
    matches!(
        status.trim().to_ascii_lowercase().as_str(),
        "completed" | "complete" | "success" | "successful" | "settled" | "paid"
    )
}

fn simulated_result(
    provider: Provider,
    canonical: &str,
    expected_amount: Option<&BigDecimal>,
) -> VerificationResult {
    VerificationResult {
        success: true,
        provider,
        transaction_id: canonical.to_string(),
        amount: expected_amount.cloned(),
        currency: "ETB".to_string(),
        status: "simulated".to_string(),
        message: "verification skipped by configuration".to_string(),
        raw: json!({ "simulated": true }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict_rules() -> IdentityRules {
        IdentityRules {
            check_name: true,
            check_account: true,
            expected_name: Some("MUDAY WALLET PLC".to_string()),
            expected_account: Some("251911223344".to_string()),
        }
    }

    fn good_receipt() -> ParsedReceipt {
        ParsedReceipt {
            reference: Some("CCH3A2B8X9".to_string()),
            receiver_name: Some("MUDAY WALLET PLC".to_string()),
            receiver_account: Some("251911223344".to_string()),
            amount: Some("1000.00".parse().unwrap()),
            status: Some("Completed".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_judge_accepts_matching_receipt() {
        let expected: BigDecimal = "1000.00".parse().unwrap();
        let result = judge_receipt(
            Provider::Telebirr,
            "CCH3A2B8X9",
            good_receipt(),
            &strict_rules(),
            Some(&expected),
        )
        .unwrap();

        assert!(result.success);
        assert_eq!(result.transaction_id, "CCH3A2B8X9");
        assert_eq!(result.amount, Some(expected));
        assert_eq!(result.currency, "ETB");
    }

    #[test]
    fn test_judge_amount_mismatch_is_typed() {
        let expected: BigDecimal = "500.00".parse().unwrap();
        let err = judge_receipt(
            Provider::Telebirr,
            "CCH3A2B8X9",
            good_receipt(),
            &strict_rules(),
            Some(&expected),
        )
        .unwrap_err();

        match err {
            VerifyError::AmountMismatch { expected, actual } => {
                assert_eq!(expected, "500.00".parse().unwrap());
                assert_eq!(actual, "1000.00".parse().unwrap());
            }
            other => panic!("expected AmountMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_judge_collects_identity_reasons() {
        let mut receipt = good_receipt();
        receipt.receiver_name = Some("SELAM TRADING".to_string());
        receipt.status = Some("Pending".to_string());

        let err = judge_receipt(
            Provider::Telebirr,
            "CCH3A2B8X9",
            receipt,
            &strict_rules(),
            None,
        )
        .unwrap_err();

        match err {
            VerifyError::IdentityMismatch { reasons } => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].contains("receiver name"));
                assert!(reasons[1].contains("status"));
            }
            other => panic!("expected IdentityMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_judge_without_expected_amount_uses_receipt() {
        let result = judge_receipt(
            Provider::Cbe,
            "FT25301S1PV5083797",
            good_receipt(),
            &strict_rules(),
            None,
        )
        .unwrap();

        assert_eq!(result.amount, Some("1000.00".parse().unwrap()));
    }

    #[test]
    fn test_judge_falls_back_to_total_paid() {
        let mut receipt = good_receipt();
        receipt.amount = None;
        receipt.total_paid = Some("1000.00".parse().unwrap());

        let expected: BigDecimal = "1000.00".parse().unwrap();
        let result = judge_receipt(
            Provider::Cbe,
            "FT25301S1PV5083797",
            receipt,
            &strict_rules(),
            Some(&expected),
        )
        .unwrap();

        assert_eq!(result.amount, Some(expected));
    }

    #[test]
    fn test_simulated_result_keeps_canonical_reference() {
        let amount: BigDecimal = "250.00".parse().unwrap();
        let result = simulated_result(Provider::Cbe, "FT25301S1PV5083797", Some(&amount));

        assert!(result.success);
        assert_eq!(result.status, "simulated");
        assert_eq!(result.transaction_id, "FT25301S1PV5083797");
        assert_eq!(result.amount, Some(amount));
    }

    #[test]
    fn test_status_is_settled() {
        assert!(status_is_settled("Completed"));
        assert!(status_is_settled(" success "));
        assert!(!status_is_settled("Pending"));
        assert!(!status_is_settled("Failed"));
    }
}
