use anyhow::{Context, Result};
use std::sync::Arc;

use flip_scanner::api::{EbayClient, MarketplaceSource, VintedClient};
use flip_scanner::core::{logging, server, Config, HealthChecker, PipelineMetrics};
use flip_scanner::monitoring::{Notifier, SqliteDedupStore, WhatsAppNotifier};
use flip_scanner::scanner::{EvaluationPipeline, PipelineConfig, PollScheduler};
use flip_scanner::strategy::{RuleSet, ValuationEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    logging::init_logging(&config.service.log_level, &config.service.env);

    tracing::info!("🚀 Flip scanner starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Profit threshold: £{:.2}, poll interval: {}s",
        config.search.profit_threshold_gbp,
        config.search.poll_interval_secs
    );
    for key in config.missing_values() {
        tracing::warn!("⚠️  {} is not set", key);
    }

    let health = HealthChecker::new();
    let metrics = Arc::new(PipelineMetrics::new()?);

    let store = Arc::new(
        SqliteDedupStore::new(&config.service.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.service.db_path))?,
    );
    health.update_component("database", store.ping().await).await;
    if let Ok(stats) = store.get_statistics().await {
        tracing::info!(
            "📦 Store holds {} seen items and {} alerts",
            stats.seen_items,
            stats.alerts_sent
        );
    }

    let notifier: Arc<dyn Notifier> = Arc::new(WhatsAppNotifier::new(
        config.whatsapp.clone(),
        config.http_timeout(),
    )?);
    health
        .update_component(
            "notifier",
            !config.whatsapp.access_token.is_empty() && !config.whatsapp.phone_number_id.is_empty(),
        )
        .await;

    let sources = build_sources(&config)?;
    for source in &sources {
        health.update_component(source.marketplace().as_str(), true).await;
    }

    let rules = Arc::new(RuleSet::load_or_default(&config.search.rules_path));
    let pipeline = Arc::new(
        EvaluationPipeline::new(
            sources,
            store,
            notifier.clone(),
            ValuationEngine::new(rules),
            PipelineConfig {
                keywords: config.search.keywords.clone(),
                profit_threshold: config.search.profit_threshold_gbp,
                fetch_timeout: config.http_timeout() * 2,
            },
        )
        .with_metrics(metrics.clone()),
    );

    let scheduler = PollScheduler::new(pipeline, config.poll_interval())
        .with_health(health.clone())
        .spawn();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    };
    server::serve(health, metrics, notifier, config.service.port, shutdown).await?;

    tracing::info!("🛑 Shutting down, waiting for the current cycle to finish...");
    scheduler.shutdown().await;

    Ok(())
}

fn build_sources(config: &Config) -> Result<Vec<Arc<dyn MarketplaceSource>>> {
    let mut sources: Vec<Arc<dyn MarketplaceSource>> = Vec::new();

    if config.ebay.enabled {
        sources.push(Arc::new(EbayClient::new(
            config.ebay.clone(),
            config.search.ebay_category_ids.clone(),
            config.search.limit,
            config.http_timeout(),
        )?));
    }
    if config.vinted.enabled {
        sources.push(Arc::new(VintedClient::new(
            config.vinted.clone(),
            config.search.limit,
            config.http_timeout(),
        )?));
    }

    if sources.is_empty() {
        tracing::warn!("⚠️  No marketplaces enabled; cycles will fetch nothing");
    }

    Ok(sources)
}
