use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level; outside `prod` the compact formatter without targets is
/// used.
pub fn init_logging(log_level: &str, env: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn,hyper=warn", log_level)));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if env == "prod" {
        registry.with(fmt::layer().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(false)).try_init()
    };

    match result {
        Ok(()) => tracing::info!("Logging initialized at level: {} ({})", log_level, env),
        Err(e) => eprintln!("Logging already initialized: {}", e),
    }
}
