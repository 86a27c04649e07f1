use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde_json::Value;
use std::time::Duration;

use super::marketplace::{build_http_client, MarketplaceSource};
use super::types::{parse_amount, parse_timestamp, FetchBatch, Marketplace, NormalizedItem, ParseError};
use crate::core::config::VintedConfig;

const CATALOG_ENDPOINT: &str = "/api/v2/catalog/items";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; FlipScanner/1.0)";

/// Client for the catalog search endpoint used by the Vinted web app.
///
/// There is no official public API; a session cookie may be required when
/// the endpoint is restricted.
pub struct VintedClient {
    client: Client,
    base_url: String,
    cookie: String,
    limit: u32,
}

impl VintedClient {
    pub fn new(config: VintedConfig, limit: u32, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cookie: config.cookie,
            limit,
        })
    }

    async fn request(&self, keywords: &[String]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, CATALOG_ENDPOINT);
        let params = [
            ("search_text", keywords.join(" ")),
            ("per_page", self.limit.to_string()),
            ("order", "newest_first".to_string()),
        ];

        let mut request = self
            .client
            .get(&url)
            .query(&params)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json, text/plain, */*");

        if !self.cookie.is_empty() {
            request = request.header("Cookie", &self.cookie);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Vinted search failed: {} - {}",
                status,
                error_text
            ));
        }

        response
            .json()
            .await
            .context("Failed to parse Vinted catalog response")
    }
}

#[async_trait]
impl MarketplaceSource for VintedClient {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Vinted
    }

    async fn search(&self, keywords: &[String]) -> Result<FetchBatch> {
        let payload = match self.request(keywords).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("❌ Error fetching Vinted listings: {:#}", e);
                return Ok(FetchBatch::empty());
            }
        };

        let batch = parse_catalog_response(&payload, &self.base_url);
        for rejected in &batch.rejected {
            tracing::debug!("Dropped malformed Vinted item: {}", rejected);
        }
        Ok(batch)
    }
}

pub fn parse_catalog_response(payload: &Value, base_url: &str) -> FetchBatch {
    payload
        .get("items")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| normalize_catalog_item(entry, base_url))
                .collect::<FetchBatch>()
        })
        .unwrap_or_default()
}

/// Vinted charges buyers 5% of the price plus a fixed £0.70.
pub fn buyer_protection_for(price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (price * dec!(0.05) + dec!(0.70)).round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Amounts show up as `"12.0"`, `12.0` or `{"amount": "12.0", ...}`.
fn amount_field(field: &'static str, value: Option<&Value>) -> Result<Decimal, ParseError> {
    match value {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(Value::Object(obj)) => amount_field(field, obj.get("amount")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Decimal::ZERO),
        Some(value) => parse_amount(field, value),
    }
}

pub fn normalize_catalog_item(entry: &Value, base_url: &str) -> Result<NormalizedItem, ParseError> {
    if !entry.is_object() {
        return Err(ParseError::Shape(format!("expected object, got {}", entry)));
    }

    let id = match entry.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(ParseError::MissingField("id")),
    };

    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let price_value = entry
        .get("price")
        .filter(|v| !v.is_null())
        .or_else(|| entry.get("price_amount"));
    let price = amount_field("price", price_value)?;

    let delivery_value = entry
        .get("delivery_price")
        .filter(|v| !v.is_null())
        .or_else(|| entry.get("delivery_fee"));
    let shipping_cost = amount_field("delivery_price", delivery_value)?;

    let path = entry
        .get("url")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("/items/{}", id));
    let url = if path.starts_with("http") {
        path
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    };

    let listed_at = entry
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    Ok(NormalizedItem {
        id,
        source: Marketplace::Vinted,
        title,
        url,
        buyer_protection_fee: buyer_protection_for(price),
        price,
        shipping_cost,
        // Vinted does not expose a feedback percentage.
        seller_score: None,
        listed_at,
    })
}
