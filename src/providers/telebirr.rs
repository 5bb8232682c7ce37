//! Telebirr receipt acquisition and parsing.
//!
//! Telebirr publishes receipts as HTML pages addressed by the receipt
//! number. Field labels are bilingual ("የከፋይ ስም/Payer Name"), so lookup
//! goes through lowercased containment aliases on the English half.

use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::time::Duration;

use super::fields;
use super::{ParsedReceipt, VerifyError};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct TelebirrClient {
    client: Client,
    receipt_url: String,
}

impl TelebirrClient {
    pub fn new(receipt_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        TelebirrClient {
            client,
            receipt_url,
        }
    }

    pub async fn fetch_receipt(&self, reference: &str) -> Result<String, VerifyError> {
        let url = format!(
            "{}/{}",
            self.receipt_url.trim_end_matches('/'),
            reference
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

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(VerifyError::NotFound);
        }
        Ok(body)
    }

    pub async fn fetch_parsed(&self, reference: &str) -> Result<ParsedReceipt, VerifyError> {
        let html = self.fetch_receipt(reference).await?;
        Ok(parse_receipt_html(&html))
    }
}

/// Walks every table row and pairs cells as label/value. Rows with four
/// cells carry two pairs. The result is judged leniently: whatever labels
/// are recognized get filled in, the rest stay None.
pub fn parse_receipt_html(html: &str) -> ParsedReceipt {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("tr").expect("static css selector");
    let cell_selector = Selector::parse("td, th").expect("static css selector");

    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| collapse_ws(&cell.text().collect::<Vec<_>>().join(" ")))
            .collect();

        for pair in cells.chunks(2) {
            if let [label, value] = pair {
                if !label.is_empty() && !value.is_empty() {
                    map.entry(label.to_lowercase()).or_insert_with(|| value.clone());
                }
            }
        }
    }

    build_receipt(&map)
}

fn build_receipt(map: &BTreeMap<String, String>) -> ParsedReceipt {
    let text = |aliases: &[&str]| fields::resolve(map, aliases).map(str::to_string);
    let decimal = |aliases: &[&str]| fields::resolve(map, aliases).and_then(fields::parse_decimal);

    ParsedReceipt {
        reference: text(&["receipt no", "receipt number", "transaction number", "invoice no"])
            .map(|r| r.to_uppercase()),
        payer_name: text(&["payer name", "customer name"]),
        payer_account: text(&["payer telebirr no", "payer account", "payer phone", "mobile number"]),
        receiver_name: text(&["credited party name", "receiver name", "recipient name"]),
        receiver_account: text(&[
            "credited party account",
            "receiver account",
            "receiver phone",
            "to account",
        ]),
        amount: decimal(&["settled amount", "transaction amount", "amount in birr", "amount"]),
        service_fee: decimal(&["service fee", "service charge"]),
        vat: decimal(&["vat"]),
        total_paid: decimal(&["total paid amount", "total paid", "total amount"]),
        status: text(&["transaction status", "status"]),
        date: text(&["payment date", "transaction date", "date"]),
        reason: text(&["payment reason", "service type", "reason"]),
    }
}

fn collapse_ws(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
