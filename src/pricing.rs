//! Fee and conversion quotes.
//!
//! Deposits arrive in birr and credit the wallet in USDT: fee comes off the
//! gross first, then the net converts at the configured rate. Card top-ups
//! stay in card currency; the fee goes on top of the requested amount.
//! Wallet amounts round to six decimals, fees to two.

use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::db::models::PricingConfig;

const WALLET_SCALE: i64 = 6;
const FEE_SCALE: i64 = 2;

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("amount must be positive")]
    AmountNotPositive,
    #[error("amount too small to cover fees")]
    AmountTooLow,
    #[error("amount is below the minimum of {0}")]
    BelowMinimum(BigDecimal),
    #[error("amount is above the maximum of {0}")]
    AboveMaximum(BigDecimal),
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositQuote {
    pub gross_native: BigDecimal,
    pub fee_native: BigDecimal,
    pub net_native: BigDecimal,
    pub rate: BigDecimal,
    pub credited: BigDecimal,
}

impl DepositQuote {
    /// Snapshot persisted on the ledger row so the deal can be audited
    /// after the live rate changes.
    pub fn rate_snapshot(&self) -> serde_json::Value {
        json!({
            "usdt_rate": self.rate.to_string(),
            "fee_native": self.fee_native.to_string(),
            "net_native": self.net_native.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopupQuote {
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    /// Amount plus fee, debited from the wallet.
    pub total_charged: BigDecimal,
}

pub fn quote_deposit(
    pricing: &PricingConfig,
    gross_native: &BigDecimal,
) -> Result<DepositQuote, QuoteError> {
    if gross_native <= &BigDecimal::from(0) {
        return Err(QuoteError::AmountNotPositive);
    }

    let fee = percent_of(gross_native, &pricing.deposit_percent_fee) + &pricing.deposit_flat_fee;
    let fee = fee.round(FEE_SCALE);
    let net = gross_native - &fee;
    if net <= BigDecimal::from(0) {
        return Err(QuoteError::AmountTooLow);
    }

    let credited = (&net / &pricing.usdt_rate).round(WALLET_SCALE);
    if credited <= BigDecimal::from(0) {
        return Err(QuoteError::AmountTooLow);
    }

    Ok(DepositQuote {
        gross_native: gross_native.clone(),
        fee_native: fee,
        net_native: net,
        rate: pricing.usdt_rate.clone(),
        credited,
    })
}

/// Bounds check that runs before any balance is touched.
pub fn enforce_topup_limits(
    pricing: &PricingConfig,
    amount: &BigDecimal,
) -> Result<(), QuoteError> {
    if amount <= &BigDecimal::from(0) {
        return Err(QuoteError::AmountNotPositive);
    }
    if let Some(min) = &pricing.topup_min {
        if amount < min {
            return Err(QuoteError::BelowMinimum(min.clone()));
        }
    }
    if let Some(max) = &pricing.topup_max {
        if amount > max {
            return Err(QuoteError::AboveMaximum(max.clone()));
        }
    }
    Ok(())
}

pub fn quote_topup(pricing: &PricingConfig, amount: &BigDecimal) -> Result<TopupQuote, QuoteError> {
    enforce_topup_limits(pricing, amount)?;

    let fee = (percent_of(amount, &pricing.topup_percent_fee) + &pricing.topup_flat_fee)
        .round(FEE_SCALE);
    let total_charged = amount + &fee;

    Ok(TopupQuote {
        amount: amount.clone(),
        fee,
        total_charged,
    })
}

fn percent_of(amount: &BigDecimal, percent: &BigDecimal) -> BigDecimal {
    (amount * percent) / BigDecimal::from(100)
}
