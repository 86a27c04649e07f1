pub mod database;
pub mod notifier;
pub mod reporter;

pub use database::{DedupStore, InMemoryDedupStore, SqliteDedupStore, StoreError, StoreStatistics};
pub use notifier::{Notifier, NotifyError, WhatsAppNotifier};
pub use reporter::{format_alert, format_cycle_summary};
