//! HTTP client for the StroWallet virtual-card API.
//!
//! Calls that move money sit behind a circuit breaker: once the provider
//! fails repeatedly we stop hammering it and surface CircuitOpen instead.
//! Response shapes drift between provider releases, so numeric fields are
//! extracted tolerantly from the JSON rather than deserialized strictly.

use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config as BreakerConfig, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum CardApiError {
    #[error("card provider request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("card not found: {0}")]
    CardNotFound(String),
    #[error("card provider rejected the call: {0}")]
    Api(String),
    #[error("invalid response from card provider: {0}")]
    InvalidResponse(String),
    #[error("card provider circuit breaker is open")]
    CircuitOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardBalance {
    pub balance: BigDecimal,
    pub currency: String,
}

/// One provider-side card transaction, reduced to the fields the
/// reconciliation comparison needs.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderTransaction {
    pub external_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct StroWalletClient {
    client: Client,
    base_url: String,
    public_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl StroWalletClient {
    pub fn new(base_url: String, public_key: String) -> Self {
        Self::with_circuit_breaker(base_url, public_key, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        public_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = BreakerConfig::new().failure_policy(policy).build();

        StroWalletClient {
            client,
            base_url,
            public_key,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Loads funds onto a card. Returns the raw provider payload so the
    /// caller can persist it alongside the ledger row.
    pub async fn fund_card(
        &self,
        card_id: &str,
        amount: &BigDecimal,
    ) -> Result<Value, CardApiError> {
        let body = json!({
            "public_key": self.public_key,
            "card_id": card_id,
            "amount": amount.to_string(),
        });
        self.post("fund-card", card_id, body).await
    }

    pub async fn card_balance(&self, card_id: &str) -> Result<CardBalance, CardApiError> {
        let body = json!({
            "public_key": self.public_key,
            "card_id": card_id,
        });
        let payload = self.post("fetch-card-detail", card_id, body).await?;

        let balance = find_field(&payload, &["balance", "card_balance", "available_balance"])
            .and_then(value_to_decimal)
            .ok_or_else(|| {
                CardApiError::InvalidResponse("balance missing from card detail".to_string())
            })?;
        let currency = find_field(&payload, &["currency", "card_currency"])
            .and_then(Value::as_str)
            .unwrap_or("USD")
            .to_string();

        Ok(CardBalance { balance, currency })
    }

    pub async fn card_transactions(
        &self,
        card_id: &str,
    ) -> Result<Vec<ProviderTransaction>, CardApiError> {
        let body = json!({
            "public_key": self.public_key,
            "card_id": card_id,
        });
        let payload = self.post("card-transactions", card_id, body).await?;

        let items = extract_array(&payload).ok_or_else(|| {
            CardApiError::InvalidResponse("transaction list missing from response".to_string())
        })?;

        Ok(items.iter().map(parse_provider_transaction).collect())
    }

    async fn post(&self, path: &str, card_id: &str, body: Value) -> Result<Value, CardApiError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let client = self.client.clone();
        let card = card_id.to_string();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.post(&url).json(&body).send().await?;

                if response.status() == 404 {
                    return Err(CardApiError::CardNotFound(card));
                }
                if !response.status().is_success() {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(CardApiError::Api(format!(
                        "status {}: {}",
                        status,
                        snippet(&text)
                    )));
                }

                let payload = response.json::<Value>().await?;
                if let Some(message) = failure_message(&payload) {
                    return Err(CardApiError::Api(message));
                }
                Ok(payload)
            })
            .await;

        match result {
            Ok(payload) => Ok(payload),
            Err(FailsafeError::Rejected) => Err(CardApiError::CircuitOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

/// Some provider errors come back with HTTP 200 and a success flag.
fn failure_message(payload: &Value) -> Option<String> {
    match payload.get("success") {
        Some(Value::Bool(false)) => {}
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => {}
        _ => return None,
    }

    let message = find_field(payload, &["message", "error", "detail"])
        .and_then(Value::as_str)
        .unwrap_or("provider reported failure");
    Some(message.to_string())
}

/// Looks for a key at the top level, then one object level down. Provider
/// payloads wrap the useful part in "data" / "card_detail" envelopes.
fn find_field<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = payload.as_object()?;

    for key in keys {
        if let Some(value) = obj.get(*key) {
            if !value.is_null() {
                return Some(value);
            }
        }
    }
    for nested in obj.values().filter(|v| v.is_object()) {
        for key in keys {
            if let Some(value) = nested.get(*key) {
                if !value.is_null() {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn extract_array(payload: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = payload.as_array() {
        return Some(items);
    }
    for key in ["transactions", "data", "history", "card_transactions"] {
        if let Some(items) = payload.get(key).and_then(Value::as_array) {
            return Some(items);
        }
    }
    None
}

fn parse_provider_transaction(item: &Value) -> ProviderTransaction {
    ProviderTransaction {
        external_id: find_field(item, &["id", "transaction_id", "txn_id", "reference"])
            .map(value_to_string),
        amount: find_field(item, &["amount", "amt", "value"]).and_then(value_to_decimal),
        currency: find_field(item, &["currency"])
            .and_then(Value::as_str)
            .map(str::to_string),
        description: find_field(item, &["narrative", "description", "merchant", "title"])
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn value_to_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn snippet(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = StroWalletClient::new(
            "https://strowallet.com/api/bitvcard".to_string(),
            "pk_test".to_string(),
        );
        assert_eq!(client.circuit_state(), "closed");
    }

    #[test]
    fn test_find_field_nested() {
        let payload = json!({
            "success": true,
            "card_detail": { "balance": "25.50", "currency": "USD" }
        });

        let balance = find_field(&payload, &["balance"]).and_then(value_to_decimal);
        assert_eq!(balance, Some("25.50".parse().unwrap()));
    }

    #[test]
    fn test_find_field_prefers_top_level() {
        let payload = json!({
            "balance": "10.00",
            "data": { "balance": "99.00" }
        });

        let balance = find_field(&payload, &["balance"]).and_then(value_to_decimal);
        assert_eq!(balance, Some("10.00".parse().unwrap()));
    }

    #[test]
    fn test_failure_message_detection() {
        assert_eq!(
            failure_message(&json!({ "success": false, "message": "card blocked" })),
            Some("card blocked".to_string())
        );
        assert_eq!(
            failure_message(&json!({ "success": "false" })),
            Some("provider reported failure".to_string())
        );
        assert_eq!(failure_message(&json!({ "success": true })), None);
        assert_eq!(failure_message(&json!({ "card_detail": {} })), None);
    }

    #[test]
    fn test_extract_array_variants() {
        let wrapped = json!({ "transactions": [ { "id": 1 } ] });
        assert_eq!(extract_array(&wrapped).map(Vec::len), Some(1));

        let root = json!([ { "id": 1 }, { "id": 2 } ]);
        assert_eq!(extract_array(&root).map(Vec::len), Some(2));

        assert!(extract_array(&json!({ "success": true })).is_none());
    }

    #[test]
    fn test_parse_provider_transaction_tolerates_shapes() {
        let item = json!({
            "transaction_id": 981,
            "amount": 12.5,
            "currency": "USD",
            "narrative": "Uber trip"
        });
        let parsed = parse_provider_transaction(&item);

        assert_eq!(parsed.external_id.as_deref(), Some("981"));
        assert_eq!(parsed.amount, Some("12.5".parse().unwrap()));
        assert_eq!(parsed.currency.as_deref(), Some("USD"));
        assert_eq!(parsed.description.as_deref(), Some("Uber trip"));
    }
}
