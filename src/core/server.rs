use anyhow::{Context, Result};
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::health::HealthChecker;
use super::metrics::PipelineMetrics;
use crate::monitoring::notifier::Notifier;
use crate::monitoring::reporter::{format_alert, sample_evaluation};

/// Status surface: `GET /health`, `GET /metrics` and `POST /test-alert`.
pub fn routes(
    health: HealthChecker,
    metrics: Arc<PipelineMetrics>,
    notifier: Arc<dyn Notifier>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::any().map(move || health.clone()))
        .and_then(health_handler);

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::any().map(move || metrics.clone()))
        .and_then(metrics_handler);

    let test_alert = warp::path("test-alert")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::any().map(move || notifier.clone()))
        .and_then(test_alert_handler);

    health.or(metrics).or(test_alert)
}

pub async fn serve(
    health: HealthChecker,
    metrics: Arc<PipelineMetrics>,
    notifier: Arc<dyn Notifier>,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let (bound, server) = warp::serve(routes(health, metrics, notifier))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .with_context(|| format!("Failed to bind status endpoint on {}", addr))?;

    tracing::info!("✅ Status endpoint running on {}", bound);
    server.await;
    Ok(())
}

async fn health_handler(checker: HealthChecker) -> Result<impl Reply, Infallible> {
    let status = checker.get_status().await;
    Ok(warp::reply::json(&status))
}

async fn metrics_handler(metrics: Arc<PipelineMetrics>) -> Result<impl Reply, Infallible> {
    let reply = match metrics.encode() {
        Ok(text) => warp::reply::with_status(text, StatusCode::OK),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            warp::reply::with_status(String::new(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    Ok(reply)
}

async fn test_alert_handler(notifier: Arc<dyn Notifier>) -> Result<impl Reply, Infallible> {
    let message = format_alert(&sample_evaluation());

    let reply = match notifier.send(&message).await {
        Ok(()) => warp::reply::with_status(
            warp::reply::json(&json!({"message": "Test alert sent."})),
            StatusCode::OK,
        ),
        Err(e) => {
            tracing::error!("Failed to send test alert: {}", e);
            warp::reply::with_status(
                warp::reply::json(&json!({"detail": "Failed to send test alert"})),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::notifier::{MockNotifier, NotifyError};

    fn notifier(succeed: bool) -> Arc<dyn Notifier> {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(1).returning(move |text: &str| {
            assert!(text.contains("Sample Golf Item"));
            if succeed {
                Ok(())
            } else {
                Err(NotifyError::NotConfigured("test"))
            }
        });
        Arc::new(notifier)
    }

    #[tokio::test]
    async fn test_health_route() {
        let health = HealthChecker::new();
        health.update_component("database", true).await;
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let api = routes(health, metrics, Arc::new(MockNotifier::new()));

        let resp = warp::test::request().method("GET").path("/health").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["components"]["database"], true);
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        metrics.record_cycle(std::time::Duration::from_secs(1));
        let api = routes(HealthChecker::new(), metrics, Arc::new(MockNotifier::new()));

        let resp = warp::test::request().method("GET").path("/metrics").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = String::from_utf8(resp.body().to_vec()).unwrap();
        assert!(body.contains("flip_cycles_total 1"));
    }

    #[tokio::test]
    async fn test_alert_route_success_and_failure() {
        let metrics = Arc::new(PipelineMetrics::new().unwrap());

        let api = routes(HealthChecker::new(), metrics.clone(), notifier(true));
        let resp = warp::test::request().method("POST").path("/test-alert").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["message"], "Test alert sent.");

        let api = routes(HealthChecker::new(), metrics, notifier(false));
        let resp = warp::test::request().method("POST").path("/test-alert").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_alert_route_rejects_get() {
        let api = routes(
            HealthChecker::new(),
            Arc::new(PipelineMetrics::new().unwrap()),
            Arc::new(MockNotifier::new()),
        );
        let resp = warp::test::request().method("GET").path("/test-alert").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
