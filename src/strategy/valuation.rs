use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::rules::RuleSet;
use crate::api::NormalizedItem;

const HIGH_RISK_BELOW: Decimal = dec!(90);
const LOW_RISK_FROM: Decimal = dec!(98);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskTag {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            RiskTag::Low => "Low",
            RiskTag::Medium => "Medium",
            RiskTag::High => "High",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValuationError {
    #[error("amount overflow while computing {0}")]
    Overflow(&'static str),
}

/// Profit estimate for one item. Recomputed every time, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub item: NormalizedItem,
    pub total_cost: Decimal,
    pub resale_value: Decimal,
    pub profit: Decimal,
    pub risk: RiskTag,
}

#[derive(Debug, Clone)]
pub struct ValuationEngine {
    rules: Arc<RuleSet>,
}

impl ValuationEngine {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    pub fn compute_resale_value(&self, item: &NormalizedItem) -> Result<Decimal, ValuationError> {
        // Free or invalid listings never reach the matcher.
        if item.price <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        item.price
            .checked_mul(self.rules.multiplier_for(&item.title))
            .ok_or(ValuationError::Overflow("resale value"))
    }

    pub fn compute_risk(
        seller_score: Option<Decimal>,
        buyer_protection_fee: Decimal,
        shipping_cost: Decimal,
    ) -> RiskTag {
        let score = match seller_score {
            Some(score) if score >= HIGH_RISK_BELOW => score,
            _ => return RiskTag::High,
        };
        if buyer_protection_fee.is_zero() || shipping_cost.is_zero() {
            return RiskTag::High;
        }
        if score >= LOW_RISK_FROM {
            RiskTag::Low
        } else {
            RiskTag::Medium
        }
    }

    pub fn evaluate(&self, item: &NormalizedItem) -> Result<Evaluation, ValuationError> {
        let total_cost = item
            .price
            .checked_add(item.buyer_protection_fee)
            .and_then(|sum| sum.checked_add(item.shipping_cost))
            .ok_or(ValuationError::Overflow("total cost"))?;
        let resale_value = self.compute_resale_value(item)?;
        let profit = resale_value
            .checked_sub(total_cost)
            .ok_or(ValuationError::Overflow("profit"))?;
        let risk = Self::compute_risk(
            item.seller_score,
            item.buyer_protection_fee,
            item.shipping_cost,
        );

        tracing::debug!(
            "📊 Valued {} {}: cost £{:.2}, resale £{:.2}, profit £{:.2} [{}]",
            item.source,
            item.id,
            total_cost,
            resale_value,
            profit,
            risk
        );

        Ok(Evaluation {
            item: item.clone(),
            total_cost,
            resale_value,
            profit,
            risk,
        })
    }
}
