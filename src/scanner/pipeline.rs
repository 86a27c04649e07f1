use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::api::{Marketplace, MarketplaceSource, NormalizedItem};
use crate::core::metrics::PipelineMetrics;
use crate::monitoring::database::{DedupStore, StoreError};
use crate::monitoring::notifier::Notifier;
use crate::monitoring::reporter::format_alert;
use crate::strategy::{ValuationEngine, ValuationError};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub keywords: Vec<String>,
    pub profit_threshold: Decimal,
    pub fetch_timeout: Duration,
}

/// Why one item could not be carried to a terminal outcome.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Valuation(#[from] ValuationError),
}

/// Terminal state of one item within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemOutcome {
    /// Seen in an earlier cycle (or earlier in this one).
    Skipped,
    /// Persisted and evaluated, profit below threshold.
    NoAlert,
    /// Profitable but an alert record already exists.
    AlreadyAlerted,
    Alerted,
    /// Profitable, but the send failed; no alert record was written.
    NotifyFailed,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Skipped => "skipped",
            ItemOutcome::NoAlert => "no_alert",
            ItemOutcome::AlreadyAlerted => "already_alerted",
            ItemOutcome::Alerted => "alerted",
            ItemOutcome::NotifyFailed => "notify_failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub skipped: usize,
    pub no_alert: usize,
    pub already_alerted: usize,
    pub alerted: usize,
    pub notify_failed: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::NoAlert => self.no_alert += 1,
            ItemOutcome::AlreadyAlerted => self.already_alerted += 1,
            ItemOutcome::Alerted => self.alerted += 1,
            ItemOutcome::NotifyFailed => self.notify_failed += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub fetched: usize,
    pub rejected: usize,
    pub failed_sources: Vec<Marketplace>,
    pub outcomes: OutcomeCounts,
    pub item_errors: usize,
}

impl CycleReport {
    pub fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            fetched: 0,
            rejected: 0,
            failed_sources: Vec::new(),
            outcomes: OutcomeCounts::default(),
            item_errors: 0,
        }
    }
}

impl Default for CycleReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch, dedup, evaluate and notify, one poll cycle at a time.
///
/// Fetches from all sources run concurrently; the merged batch is then
/// processed strictly one item at a time, because the store's
/// check-then-insert is not atomic. Cycles never overlap.
pub struct EvaluationPipeline {
    sources: Vec<Arc<dyn MarketplaceSource>>,
    store: Arc<dyn DedupStore>,
    notifier: Arc<dyn Notifier>,
    engine: ValuationEngine,
    config: PipelineConfig,
    metrics: Option<Arc<PipelineMetrics>>,
    cycle_lock: Mutex<()>,
}

impl EvaluationPipeline {
    pub fn new(
        sources: Vec<Arc<dyn MarketplaceSource>>,
        store: Arc<dyn DedupStore>,
        notifier: Arc<dyn Notifier>,
        engine: ValuationEngine,
        config: PipelineConfig,
    ) -> Self {
        Self {
            sources,
            store,
            notifier,
            engine,
            config,
            metrics: None,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;

        let mut report = CycleReport::new();
        let span = tracing::info_span!("poll_cycle", cycle_id = %report.cycle_id);
        self.execute_cycle(&mut report).instrument(span).await;
        report
    }

    async fn execute_cycle(&self, report: &mut CycleReport) {
        let start = Instant::now();
        tracing::info!(
            "🔍 Polling {} marketplaces for keywords: {}",
            self.sources.len(),
            self.config.keywords.join(", ")
        );

        let items = self.fetch_all(report).await;
        tracing::info!(
            "📥 Fetched {} items ({} malformed dropped)",
            items.len(),
            report.rejected
        );

        for item in &items {
            match self.process_item(item).await {
                Ok(outcome) => {
                    report.outcomes.record(outcome);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_outcome(outcome);
                    }
                }
                Err(e) => {
                    report.item_errors += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_item_error();
                    }
                    tracing::error!(
                        "❌ Error processing item {} {}: {}",
                        item.source,
                        item.id,
                        e
                    );
                }
            }
        }

        report.duration = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(report.duration);
        }

        tracing::info!(
            "✅ Cycle complete in {:.2}s: {} alerted, {} below threshold, {} already seen, {} errors",
            report.duration.as_secs_f64(),
            report.outcomes.alerted,
            report.outcomes.no_alert,
            report.outcomes.skipped,
            report.item_errors
        );
    }

    /// Queries every source concurrently and merges the results in source
    /// registration order. A failing or slow source contributes no items.
    async fn fetch_all(&self, report: &mut CycleReport) -> Vec<NormalizedItem> {
        let keywords = self.config.keywords.as_slice();
        let timeout = self.config.fetch_timeout;

        let fetches = self.sources.iter().map(|source| async move {
            let result = tokio::time::timeout(timeout, source.search(keywords)).await;
            (source.marketplace(), result)
        });
        let results = join_all(fetches).await;

        let mut items = Vec::new();
        for (marketplace, result) in results {
            match result {
                Ok(Ok(batch)) => {
                    tracing::debug!(
                        "{}: {} items, {} malformed",
                        marketplace,
                        batch.items.len(),
                        batch.rejected.len()
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_fetch(marketplace, batch.items.len(), batch.rejected.len());
                    }
                    report.fetched += batch.items.len();
                    report.rejected += batch.rejected.len();
                    items.extend(batch.items);
                }
                Ok(Err(e)) => {
                    tracing::error!("❌ Error fetching {} listings: {:#}", marketplace, e);
                    self.record_source_failure(report, marketplace);
                }
                Err(_) => {
                    tracing::error!(
                        "⏱️  {} fetch timed out after {}s",
                        marketplace,
                        timeout.as_secs()
                    );
                    self.record_source_failure(report, marketplace);
                }
            }
        }

        items
    }

    fn record_source_failure(&self, report: &mut CycleReport, marketplace: Marketplace) {
        report.failed_sources.push(marketplace);
        if let Some(metrics) = &self.metrics {
            metrics.record_source_failure(marketplace);
        }
    }

    /// Runs one item through dedup, evaluation and notification.
    ///
    /// Once `insert` succeeds the item stays seen no matter what happens
    /// afterwards. A store or valuation error aborts this item only.
    pub async fn process_item(&self, item: &NormalizedItem) -> Result<ItemOutcome, ItemError> {
        if self.store.exists(&item.id, item.source).await? {
            tracing::debug!("Skipping already seen {} {}", item.source, item.id);
            return Ok(ItemOutcome::Skipped);
        }

        self.store.insert(item).await?;

        let evaluation = self.engine.evaluate(item)?;
        if evaluation.profit < self.config.profit_threshold {
            tracing::debug!(
                "{} {} below threshold: profit £{:.2}",
                item.source,
                item.id,
                evaluation.profit
            );
            return Ok(ItemOutcome::NoAlert);
        }

        // A crash between send and record in an earlier cycle leaves the
        // alert row as the only guard against a second send.
        if self.store.alert_sent(&item.id, item.source).await? {
            return Ok(ItemOutcome::AlreadyAlerted);
        }

        let message = format_alert(&evaluation);
        if let Err(e) = self.notifier.send(&message).await {
            tracing::warn!(
                "⚠️  Failed to send alert for {} {} (profit £{:.2}): {}",
                item.source,
                item.id,
                evaluation.profit,
                e
            );
            return Ok(ItemOutcome::NotifyFailed);
        }

        self.store.record_alert(&item.id, item.source).await?;
        tracing::info!(
            "🎯 Alert sent for {} {} with profit £{:.2} [{}]",
            item.source,
            item.id,
            evaluation.profit,
            evaluation.risk
        );

        Ok(ItemOutcome::Alerted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::marketplace::MockMarketplaceSource;
    use crate::api::FetchBatch;
    use crate::monitoring::database::MockDedupStore;
    use crate::monitoring::notifier::{MockNotifier, NotifyError};
    use crate::strategy::RuleSet;
    use mockall::Sequence;
    use rust_decimal_macros::dec;

    fn item(id: &str, price: Decimal) -> NormalizedItem {
        NormalizedItem {
            id: id.to_string(),
            source: Marketplace::Ebay,
            title: "Generic iron set".to_string(),
            url: format!("https://example.com/{}", id),
            price,
            buyer_protection_fee: dec!(1),
            shipping_cost: dec!(2),
            seller_score: Some(dec!(99)),
            listed_at: None,
        }
    }

    fn pipeline(
        sources: Vec<Arc<dyn MarketplaceSource>>,
        store: MockDedupStore,
        notifier: MockNotifier,
    ) -> EvaluationPipeline {
        EvaluationPipeline::new(
            sources,
            Arc::new(store),
            Arc::new(notifier),
            ValuationEngine::new(Arc::new(RuleSet::default())),
            PipelineConfig {
                keywords: vec!["golf".to_string()],
                profit_threshold: dec!(12),
                fetch_timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn test_seen_item_is_skipped_without_insert() {
        let mut store = MockDedupStore::new();
        store.expect_exists().times(1).returning(|_, _| Ok(true));
        store.expect_insert().times(0);
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(0);

        let outcome = pipeline(vec![], store, notifier)
            .process_item(&item("1", dec!(30)))
            .await
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_profitable_item_sends_then_records() {
        let mut seq = Sequence::new();
        let mut store = MockDedupStore::new();
        let mut notifier = MockNotifier::new();

        store
            .expect_exists()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(false));
        store
            .expect_insert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_alert_sent()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(false));
        notifier
            .expect_send()
            .withf(|text: &str| text.contains("Estimated profit: £12.00"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_record_alert()
            .withf(|id: &str, source: &Marketplace| id == "1" && *source == Marketplace::Ebay)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let outcome = pipeline(vec![], store, notifier)
            .process_item(&item("1", dec!(30)))
            .await
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Alerted);
    }

    #[tokio::test]
    async fn test_existing_alert_suppresses_send() {
        let mut store = MockDedupStore::new();
        store.expect_exists().returning(|_, _| Ok(false));
        store.expect_insert().returning(|_| Ok(()));
        store.expect_alert_sent().returning(|_, _| Ok(true));
        store.expect_record_alert().times(0);
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(0);

        let outcome = pipeline(vec![], store, notifier)
            .process_item(&item("1", dec!(30)))
            .await
            .unwrap();
        assert_eq!(outcome, ItemOutcome::AlreadyAlerted);
    }

    #[tokio::test]
    async fn test_failed_send_leaves_no_alert_record() {
        let mut store = MockDedupStore::new();
        store.expect_exists().returning(|_, _| Ok(false));
        store.expect_insert().times(1).returning(|_| Ok(()));
        store.expect_alert_sent().returning(|_, _| Ok(false));
        store.expect_record_alert().times(0);
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .times(1)
            .returning(|_| Err(NotifyError::NotConfigured("test")));

        let outcome = pipeline(vec![], store, notifier)
            .process_item(&item("1", dec!(30)))
            .await
            .unwrap();
        assert_eq!(outcome, ItemOutcome::NotifyFailed);
    }

    #[tokio::test]
    async fn test_insert_failure_aborts_item_but_not_batch() {
        let mut store = MockDedupStore::new();
        store.expect_exists().returning(|_, _| Ok(false));
        store
            .expect_insert()
            .withf(|item: &NormalizedItem| item.id == "bad")
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("disk full".to_string())));
        store
            .expect_insert()
            .withf(|item: &NormalizedItem| item.id == "good")
            .times(1)
            .returning(|_| Ok(()));
        store.expect_alert_sent().times(0);
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(0);

        let mut source = MockMarketplaceSource::new();
        source.expect_marketplace().return_const(Marketplace::Ebay);
        source.expect_search().times(1).returning(|_| {
            Ok(FetchBatch {
                items: vec![item("bad", dec!(10)), item("good", dec!(10))],
                rejected: vec![],
            })
        });

        let sources: Vec<Arc<dyn MarketplaceSource>> = vec![Arc::new(source)];
        let report = pipeline(sources, store, notifier).run_cycle().await;
        assert_eq!(report.fetched, 2);
        assert_eq!(report.item_errors, 1);
        assert_eq!(report.outcomes.no_alert, 1);
    }

    #[tokio::test]
    async fn test_record_alert_failure_after_send_is_an_item_error() {
        let mut seq = Sequence::new();
        let mut store = MockDedupStore::new();
        store.expect_exists().returning(|_, _| Ok(false));
        store.expect_insert().times(2).returning(|_| Ok(()));
        store
            .expect_alert_sent()
            .times(1)
            .returning(|_, _| Ok(false));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_record_alert()
            .withf(|id: &str, _: &Marketplace| id == "sent")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(StoreError::Unavailable("database is locked".to_string())));

        let mut source = MockMarketplaceSource::new();
        source.expect_marketplace().return_const(Marketplace::Ebay);
        source.expect_search().times(1).returning(|_| {
            Ok(FetchBatch {
                items: vec![item("sent", dec!(30)), item("next", dec!(10))],
                rejected: vec![],
            })
        });

        let sources: Vec<Arc<dyn MarketplaceSource>> = vec![Arc::new(source)];
        let report = pipeline(sources, store, notifier).run_cycle().await;

        assert_eq!(report.item_errors, 1);
        assert_eq!(report.outcomes.alerted, 0);
        assert_eq!(report.outcomes.no_alert, 1);
    }

    #[tokio::test]
    async fn test_valuation_overflow_is_an_item_error() {
        let mut store = MockDedupStore::new();
        store.expect_exists().returning(|_, _| Ok(false));
        store.expect_insert().times(1).returning(|_| Ok(()));
        store.expect_alert_sent().times(0);
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(0);

        let result = pipeline(vec![], store, notifier)
            .process_item(&item("huge", Decimal::MAX))
            .await;
        assert!(matches!(
            result,
            Err(ItemError::Valuation(ValuationError::Overflow(_)))
        ));
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_others() {
        let mut failing = MockMarketplaceSource::new();
        failing.expect_marketplace().return_const(Marketplace::Vinted);
        failing
            .expect_search()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let mut working = MockMarketplaceSource::new();
        working.expect_marketplace().return_const(Marketplace::Ebay);
        working.expect_search().returning(|_| {
            Ok(FetchBatch {
                items: vec![item("7", dec!(30))],
                rejected: vec![],
            })
        });

        let mut store = MockDedupStore::new();
        store.expect_exists().returning(|_, _| Ok(false));
        store.expect_insert().returning(|_| Ok(()));
        store.expect_alert_sent().returning(|_, _| Ok(false));
        store.expect_record_alert().times(1).returning(|_, _| Ok(()));
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(1).returning(|_| Ok(()));

        let sources: Vec<Arc<dyn MarketplaceSource>> = vec![Arc::new(failing), Arc::new(working)];
        let report = pipeline(sources, store, notifier).run_cycle().await;

        assert_eq!(report.failed_sources, vec![Marketplace::Vinted]);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.outcomes.alerted, 1);
    }

    #[test]
    fn test_outcome_counts() {
        let mut counts = OutcomeCounts::default();
        counts.record(ItemOutcome::Alerted);
        counts.record(ItemOutcome::Skipped);
        counts.record(ItemOutcome::Skipped);
        assert_eq!(counts.alerted, 1);
        assert_eq!(counts.skipped, 2);
        assert_eq!(ItemOutcome::NotifyFailed.as_str(), "notify_failed");
    }
}
