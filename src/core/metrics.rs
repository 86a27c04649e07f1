use anyhow::Result;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

use crate::api::Marketplace;
use crate::scanner::ItemOutcome;

/// Prometheus counters for the evaluation pipeline, kept on a private
/// registry so several instances can coexist in tests.
pub struct PipelineMetrics {
    registry: Registry,
    items_fetched: IntCounterVec,
    items_rejected: IntCounterVec,
    source_failures: IntCounterVec,
    item_outcomes: IntCounterVec,
    item_errors: IntCounter,
    cycles: IntCounter,
    cycle_duration: Histogram,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let items_fetched = IntCounterVec::new(
            Opts::new("flip_items_fetched_total", "Normalized items fetched per source"),
            &["source"],
        )?;
        let items_rejected = IntCounterVec::new(
            Opts::new("flip_items_rejected_total", "Malformed records dropped per source"),
            &["source"],
        )?;
        let source_failures = IntCounterVec::new(
            Opts::new("flip_source_failures_total", "Failed or timed out source fetches"),
            &["source"],
        )?;
        let item_outcomes = IntCounterVec::new(
            Opts::new("flip_item_outcomes_total", "Terminal item states"),
            &["outcome"],
        )?;
        let item_errors = IntCounter::new("flip_item_errors_total", "Items aborted by store errors")?;
        let cycles = IntCounter::new("flip_cycles_total", "Completed poll cycles")?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new("flip_cycle_duration_seconds", "Poll cycle duration")
                .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;

        registry.register(Box::new(items_fetched.clone()))?;
        registry.register(Box::new(items_rejected.clone()))?;
        registry.register(Box::new(source_failures.clone()))?;
        registry.register(Box::new(item_outcomes.clone()))?;
        registry.register(Box::new(item_errors.clone()))?;
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            registry,
            items_fetched,
            items_rejected,
            source_failures,
            item_outcomes,
            item_errors,
            cycles,
            cycle_duration,
        })
    }

    pub fn record_fetch(&self, source: Marketplace, fetched: usize, rejected: usize) {
        self.items_fetched
            .with_label_values(&[source.as_str()])
            .inc_by(fetched as u64);
        self.items_rejected
            .with_label_values(&[source.as_str()])
            .inc_by(rejected as u64);
    }

    pub fn record_source_failure(&self, source: Marketplace) {
        self.source_failures.with_label_values(&[source.as_str()]).inc();
    }

    pub fn record_outcome(&self, outcome: ItemOutcome) {
        self.item_outcomes.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn record_item_error(&self) {
        self.item_errors.inc();
    }

    pub fn record_cycle(&self, duration: Duration) {
        self.cycles.inc();
        self.cycle_duration.observe(duration.as_secs_f64());
    }

    pub fn outcome_count(&self, outcome: ItemOutcome) -> u64 {
        self.item_outcomes.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycles.get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
