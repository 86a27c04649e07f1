use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

pub const FALLBACK_MULTIPLIER: Decimal = dec!(1.5);

#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("failed to read rule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rule file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRule {
    pub brand: String,
    pub model: String,
    pub multiplier: Decimal,
}

/// Brand/model table used to estimate resale value.
///
/// `brands` keeps the declaration order of the rule file so that a title
/// naming two brands resolves to whichever was written first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuleSet {
    #[serde(default = "fallback_multiplier")]
    pub default_multiplier: Decimal,
    #[serde(default, deserialize_with = "ordered_brands")]
    pub brands: Vec<(String, Decimal)>,
    #[serde(default)]
    pub items: Vec<ItemRule>,
}

fn fallback_multiplier() -> Decimal {
    FALLBACK_MULTIPLIER
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            default_multiplier: FALLBACK_MULTIPLIER,
            brands: Vec::new(),
            items: Vec::new(),
        }
    }
}

impl RuleSet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleSetError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, RuleSetError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Loads the rule file, substituting the minimal default rule set when it
    /// cannot be read or parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(rules) => {
                tracing::info!(
                    "📐 Loaded rule set from {} ({} item rules, {} brands, default x{})",
                    path.display(),
                    rules.items.len(),
                    rules.brands.len(),
                    rules.default_multiplier
                );
                rules
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️  Failed to load rules from {}: {}; using default multiplier {}",
                    path.display(),
                    e,
                    FALLBACK_MULTIPLIER
                );
                Self::default()
            }
        }
    }

    pub fn match_item(&self, title: &str) -> Option<&ItemRule> {
        let title = title.to_lowercase();
        self.items.iter().find(|rule| {
            title.contains(&rule.brand.to_lowercase()) && title.contains(&rule.model.to_lowercase())
        })
    }

    pub fn match_brand(&self, title: &str) -> Option<(&str, Decimal)> {
        let title = title.to_lowercase();
        self.brands
            .iter()
            .find(|(brand, _)| title.contains(&brand.to_lowercase()))
            .map(|(brand, multiplier)| (brand.as_str(), *multiplier))
    }

    /// Most specific multiplier for a title: item rule, then brand, then default.
    pub fn multiplier_for(&self, title: &str) -> Decimal {
        if title.is_empty() {
            return self.default_multiplier;
        }
        if let Some(rule) = self.match_item(title) {
            return rule.multiplier;
        }
        if let Some((_, multiplier)) = self.match_brand(title) {
            return multiplier;
        }
        self.default_multiplier
    }
}

fn ordered_brands<'de, D>(deserializer: D) -> Result<Vec<(String, Decimal)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedBrands;

    impl<'de> Visitor<'de> for OrderedBrands {
        type Value = Vec<(String, Decimal)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of brand name to multiplier")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut brands: Vec<(String, Decimal)> =
                Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((brand, multiplier)) = map.next_entry::<String, Decimal>()? {
                // Repeated key: last value wins, first position is kept.
                match brands.iter_mut().find(|(existing, _)| *existing == brand) {
                    Some(entry) => entry.1 = multiplier,
                    None => brands.push((brand, multiplier)),
                }
            }
            Ok(brands)
        }
    }

    deserializer.deserialize_map(OrderedBrands)
}
