pub mod ebay;
pub mod marketplace;
pub mod types;
pub mod vinted;

pub use ebay::EbayClient;
pub use marketplace::MarketplaceSource;
pub use types::*;
pub use vinted::VintedClient;
