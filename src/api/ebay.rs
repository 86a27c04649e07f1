use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

use super::marketplace::{build_http_client, MarketplaceSource};
use super::types::{parse_amount, parse_timestamp, FetchBatch, Marketplace, NormalizedItem, ParseError};
use crate::core::config::EbayConfig;

const SEARCH_ENDPOINT: &str = "/buy/browse/v1/item_summary/search";

/// Client for the eBay Browse API item summary search.
pub struct EbayClient {
    client: Client,
    config: EbayConfig,
    category_ids: Vec<String>,
    limit: u32,
}

impl EbayClient {
    pub fn new(
        config: EbayConfig,
        category_ids: Vec<String>,
        limit: u32,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            config,
            category_ids,
            limit,
        })
    }

    async fn request(&self, keywords: &[String]) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), SEARCH_ENDPOINT);

        let mut params = vec![
            ("q", keywords.join(" ")),
            ("limit", self.limit.to_string()),
            ("sort", "newlyListed".to_string()),
        ];
        if !self.category_ids.is_empty() {
            params.push(("category_ids", self.category_ids.join(",")));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .bearer_auth(&self.config.oauth_token)
            .header("X-EBAY-C-MARKETPLACE-ID", &self.config.market)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "eBay search failed: {} - {}",
                status,
                error_text
            ));
        }

        response
            .json()
            .await
            .context("Failed to parse eBay search response")
    }
}

#[async_trait]
impl MarketplaceSource for EbayClient {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ebay
    }

    async fn search(&self, keywords: &[String]) -> Result<FetchBatch> {
        let payload = match self.request(keywords).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("❌ Error fetching eBay listings: {:#}", e);
                return Ok(FetchBatch::empty());
            }
        };

        let batch = parse_search_response(&payload);
        for rejected in &batch.rejected {
            tracing::debug!("Dropped malformed eBay item: {}", rejected);
        }
        Ok(batch)
    }
}

pub fn parse_search_response(payload: &Value) -> FetchBatch {
    payload
        .get("itemSummaries")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().map(normalize_item_summary).collect::<FetchBatch>())
        .unwrap_or_default()
}

pub fn normalize_item_summary(entry: &Value) -> Result<NormalizedItem, ParseError> {
    if !entry.is_object() {
        return Err(ParseError::Shape(format!("expected object, got {}", entry)));
    }

    let id = match entry.get("itemId") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(ParseError::MissingField("itemId")),
    };

    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let url = entry
        .get("itemWebUrl")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| entry.get("itemHref").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let price = match entry.get("price").and_then(|p| p.get("value")) {
        Some(Value::Null) | None => Decimal::ZERO,
        Some(value) => parse_amount("price.value", value)?,
    };

    // Buyer protection is folded into the listed price on eBay.
    let buyer_protection_fee = Decimal::ZERO;

    let shipping_cost = match entry
        .get("shippingOptions")
        .and_then(Value::as_array)
        .and_then(|options| options.first())
        .and_then(|option| option.get("shippingCost"))
        .and_then(|cost| cost.get("value"))
    {
        Some(Value::Null) | None => Decimal::ZERO,
        Some(value) => parse_amount("shippingCost.value", value)?,
    };

    let seller_score = entry
        .get("seller")
        .and_then(|seller| seller.get("feedbackPercentage"))
        .and_then(|score| match score {
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            _ => None,
        })
        .filter(|score| (Decimal::ZERO..=Decimal::ONE_HUNDRED).contains(score));

    let listed_at = entry
        .get("itemCreationDate")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    Ok(NormalizedItem {
        id,
        source: Marketplace::Ebay,
        title,
        url,
        price,
        buyer_protection_fee,
        shipping_cost,
        seller_score,
        listed_at,
    })
}
