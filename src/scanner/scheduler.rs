use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::pipeline::EvaluationPipeline;
use crate::core::HealthChecker;
use crate::monitoring::reporter::format_cycle_summary;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Drives `EvaluationPipeline::run_cycle` once at startup and then on a fixed
/// interval. The next cycle is only started after the previous one returned.
pub struct PollScheduler {
    pipeline: Arc<EvaluationPipeline>,
    interval: Duration,
    health: Option<HealthChecker>,
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops scheduling new cycles. A cycle already in flight runs to
    /// completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Poll scheduler task failed: {}", e);
        }
    }
}

impl PollScheduler {
    pub fn new(pipeline: Arc<EvaluationPipeline>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval: interval.max(MIN_INTERVAL),
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = Some(health);
        self
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let interval_secs = self.interval.as_secs();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    // First tick fires immediately, giving the startup cycle.
                    _ = interval.tick() => {
                        let report = self.pipeline.run_cycle().await;
                        tracing::debug!("{}", format_cycle_summary(&report));
                        if let Some(health) = &self.health {
                            health.record_cycle(&report).await;
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("🛑 Poll scheduler stopped");
        });

        tracing::info!("✅ Poll scheduler started (every {}s)", interval_secs);

        SchedulerHandle { shutdown, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FetchBatch, Marketplace, MarketplaceSource};
    use crate::monitoring::database::InMemoryDedupStore;
    use crate::monitoring::notifier::{Notifier, NotifyError};
    use crate::scanner::pipeline::PipelineConfig;
    use crate::strategy::{RuleSet, ValuationEngine};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MarketplaceSource for CountingSource {
        fn marketplace(&self) -> Marketplace {
            Marketplace::Ebay
        }

        async fn search(&self, _keywords: &[String]) -> anyhow::Result<FetchBatch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchBatch::empty())
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl Notifier for SilentNotifier {
        async fn send(&self, _text: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runs_immediately_and_stops_on_shutdown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Arc::new(EvaluationPipeline::new(
            vec![Arc::new(CountingSource {
                calls: calls.clone(),
            })],
            Arc::new(InMemoryDedupStore::new()),
            Arc::new(SilentNotifier),
            ValuationEngine::new(Arc::new(RuleSet::default())),
            PipelineConfig {
                keywords: vec![],
                profit_threshold: dec!(12),
                fetch_timeout: Duration::from_secs(5),
            },
        ));
        let health = HealthChecker::new();

        let handle = PollScheduler::new(pipeline, Duration::from_secs(3600))
            .with_health(health.clone())
            .spawn();

        for _ in 0..100 {
            if health.get_status().await.last_cycle.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(health.get_status().await.last_cycle.is_some());

        handle.shutdown().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
