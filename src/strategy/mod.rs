pub mod rules;
pub mod valuation;

pub use rules::{ItemRule, RuleSet, RuleSetError};
pub use valuation::{Evaluation, RiskTag, ValuationEngine, ValuationError};
