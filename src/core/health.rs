use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::scanner::CycleReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentHealth,
    pub last_cycle: Option<CycleSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub database: bool,
    pub notifier: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, bool>,
}

impl ComponentHealth {
    pub fn get(&self, key: &str) -> Option<bool> {
        match key {
            "database" => Some(self.database),
            "notifier" => Some(self.notifier),
            _ => self.extra.get(key).copied(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub fetched: usize,
    pub rejected: usize,
    pub failed_sources: Vec<String>,
    pub alerted: usize,
    pub item_errors: usize,
}

impl CycleSummary {
    fn from_report(report: &CycleReport) -> Self {
        Self {
            cycle_id: report.cycle_id.to_string(),
            finished_at: Utc::now(),
            duration_ms: report.duration.as_millis() as u64,
            fetched: report.fetched,
            rejected: report.rejected,
            failed_sources: report.failed_sources.iter().map(|s| s.to_string()).collect(),
            alerted: report.outcomes.alerted,
            item_errors: report.item_errors,
        }
    }
}

#[derive(Debug, Clone)]
struct HealthState {
    components: ComponentHealth,
    last_cycle: Option<CycleSummary>,
}

#[derive(Clone)]
pub struct HealthChecker {
    start_time: std::time::Instant,
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            state: Arc::new(RwLock::new(HealthState {
                components: ComponentHealth {
                    database: false,
                    notifier: false,
                    extra: HashMap::new(),
                },
                last_cycle: None,
            })),
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let state = self.state.read().await.clone();

        let cycle_ok = state
            .last_cycle
            .as_ref()
            .map(|c| c.failed_sources.is_empty())
            .unwrap_or(true);

        HealthStatus {
            status: if state.components.database && cycle_ok {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components: state.components,
            last_cycle: state.last_cycle,
        }
    }

    pub async fn update_component(&self, component: &str, healthy: bool) {
        let mut state = self.state.write().await;
        match component {
            "database" => state.components.database = healthy,
            "notifier" => state.components.notifier = healthy,
            _ => {
                state.components.extra.insert(component.to_string(), healthy);
            }
        }
    }

    /// Stores the outcome of the latest cycle and marks each source healthy
    /// unless it failed.
    pub async fn record_cycle(&self, report: &CycleReport) {
        let summary = CycleSummary::from_report(report);
        let mut state = self.state.write().await;
        for (source, healthy) in state.components.extra.iter_mut() {
            *healthy = !summary.failed_sources.contains(source);
        }
        state.last_cycle = Some(summary);
    }
}
