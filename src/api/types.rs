use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Ebay,
    Vinted,
}

impl Marketplace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Marketplace::Ebay => "ebay",
            Marketplace::Vinted => "vinted",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A listing from any marketplace, translated into one source-agnostic shape.
///
/// `(id, source)` is the identity of the listing and is never rewritten once
/// the item has been stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: String,
    pub source: Marketplace,
    pub title: String,
    pub url: String,
    pub price: Decimal,
    pub buyer_protection_fee: Decimal,
    pub shipping_cost: Decimal,
    /// Feedback percentage in `[0, 100]`; `None` means unknown, not zero.
    pub seller_score: Option<Decimal>,
    pub listed_at: Option<DateTime<Utc>>,
}

/// Why a single raw marketplace record could not be normalized.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has invalid value `{value}`")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field `{field}` must not be negative (got {value})")]
    Negative { field: &'static str, value: Decimal },

    #[error("record has unexpected shape: {0}")]
    Shape(String),
}

/// Result of one marketplace search: normalized items plus the raw records
/// that were dropped as malformed.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub items: Vec<NormalizedItem>,
    pub rejected: Vec<ParseError>,
}

impl FetchBatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, parsed: Result<NormalizedItem, ParseError>) {
        match parsed {
            Ok(item) => self.items.push(item),
            Err(e) => self.rejected.push(e),
        }
    }
}

impl FromIterator<Result<NormalizedItem, ParseError>> for FetchBatch {
    fn from_iter<I: IntoIterator<Item = Result<NormalizedItem, ParseError>>>(iter: I) -> Self {
        let mut batch = FetchBatch::empty();
        for parsed in iter {
            batch.push(parsed);
        }
        batch
    }
}

/// Largest listing amount accepted from a marketplace, in GBP.
pub const MAX_AMOUNT: Decimal = dec!(10000000);

/// Parses a money amount that marketplaces send either as a JSON string or a
/// JSON number. Amounts above `MAX_AMOUNT` are rejected.
pub(crate) fn parse_amount(
    field: &'static str,
    value: &serde_json::Value,
) -> Result<Decimal, ParseError> {
    let amount = match value {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).map_err(|_| {
            ParseError::InvalidNumber {
                field,
                value: s.clone(),
            }
        })?,
        serde_json::Value::Number(n) => {
            Decimal::from_str(&n.to_string()).map_err(|_| ParseError::InvalidNumber {
                field,
                value: n.to_string(),
            })?
        }
        other => {
            return Err(ParseError::InvalidNumber {
                field,
                value: other.to_string(),
            })
        }
    };

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ParseError::Negative {
            field,
            value: amount,
        });
    }

    if amount > MAX_AMOUNT {
        return Err(ParseError::InvalidNumber {
            field,
            value: amount.to_string(),
        });
    }

    Ok(amount)
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_marketplace_display_matches_stored_key() {
        assert_eq!(Marketplace::Ebay.to_string(), "ebay");
        assert_eq!(Marketplace::Vinted.to_string(), Marketplace::Vinted.as_str());
    }

    #[test]
    fn test_parse_amount_accepts_strings_and_numbers() {
        assert_eq!(parse_amount("price", &json!("12.99")).unwrap(), dec!(12.99));
        assert_eq!(parse_amount("price", &json!(4.5)).unwrap(), dec!(4.5));
        assert_eq!(parse_amount("price", &json!(7)).unwrap(), dec!(7));
    }

    #[test]
    fn test_parse_amount_rejects_garbage_and_negatives() {
        assert!(matches!(
            parse_amount("price", &json!("abc")),
            Err(ParseError::InvalidNumber { field: "price", .. })
        ));
        assert!(matches!(
            parse_amount("price", &json!("-3")),
            Err(ParseError::Negative { .. })
        ));
        assert!(parse_amount("price", &json!({"amount": 1})).is_err());
    }

    #[test]
    fn test_parse_amount_rejects_out_of_range_values() {
        assert_eq!(parse_amount("price", &json!("10000000")).unwrap(), MAX_AMOUNT);
        assert!(matches!(
            parse_amount("price", &json!("10000000.01")),
            Err(ParseError::InvalidNumber { field: "price", .. })
        ));
        assert!(matches!(
            parse_amount("price", &json!("79228162514264337593543950335")),
            Err(ParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_fetch_batch_splits_results() {
        let batch: FetchBatch = vec![
            Err(ParseError::MissingField("id")),
            Ok(NormalizedItem {
                id: "1".into(),
                source: Marketplace::Ebay,
                title: "Driver".into(),
                url: "https://example.com/1".into(),
                price: dec!(10),
                buyer_protection_fee: dec!(0),
                shipping_cost: dec!(0),
                seller_score: None,
                listed_at: None,
            }),
        ]
        .into_iter()
        .collect();

        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.rejected.len(), 1);
    }
}
