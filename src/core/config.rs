use anyhow::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub search: SearchConfig,
    pub ebay: EbayConfig,
    pub vinted: VintedConfig,
    pub whatsapp: WhatsAppConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub env: String,
    pub port: u16,
    pub db_path: String,
    pub log_level: String,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub keywords: Vec<String>,
    pub ebay_category_ids: Vec<String>,
    pub limit: u32,
    pub profit_threshold_gbp: Decimal,
    pub poll_interval_secs: u64,
    pub rules_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EbayConfig {
    pub enabled: bool,
    pub oauth_token: String,
    pub market: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VintedConfig {
    pub enabled: bool,
    pub base_url: String,
    pub cookie: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    pub access_token: String,
    pub phone_number_id: String,
    pub to_msisdn: String,
    pub api_base: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn bool_or(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Splits a comma separated list, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            service: ServiceConfig {
                env: var_or("ENV", "prod"),
                port: parse_or("PORT", 8080),
                db_path: var_or("DB_PATH", "./data/app.db"),
                log_level: var_or("LOG_LEVEL", "info").to_lowercase(),
                http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 30),
            },
            search: SearchConfig {
                keywords: split_list(&var_or("KEYWORDS", "")),
                ebay_category_ids: split_list(&var_or("EBAY_CATEGORY_IDS", "")),
                limit: parse_or("SEARCH_LIMIT", 20),
                profit_threshold_gbp: parse_or("PROFIT_THRESHOLD_GBP", Decimal::from(12)),
                poll_interval_secs: parse_or("POLL_INTERVAL_SECONDS", 300),
                rules_path: var_or("RULES_PATH", "./rules.json"),
            },
            ebay: EbayConfig {
                enabled: bool_or("EBAY_ENABLED", true),
                oauth_token: var_or("EBAY_OAUTH_TOKEN", ""),
                market: var_or("EBAY_MARKET", "EBAY_GB"),
                base_url: var_or("EBAY_BASE_URL", "https://api.ebay.com"),
            },
            vinted: VintedConfig {
                enabled: bool_or("VINTED_ENABLED", true),
                base_url: var_or("VINTED_BASE_URL", "https://www.vinted.co.uk"),
                cookie: var_or("VINTED_COOKIE", ""),
            },
            whatsapp: WhatsAppConfig {
                access_token: var_or("WHATSAPP_ACCESS_TOKEN", ""),
                phone_number_id: var_or("WHATSAPP_PHONE_NUMBER_ID", ""),
                to_msisdn: var_or("WHATSAPP_TO_MSISDN", ""),
                api_base: var_or("WHATSAPP_API_BASE", "https://graph.facebook.com"),
            },
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.service.http_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.search.poll_interval_secs)
    }

    /// Settings the service can run without but which leave a feature dead.
    pub fn missing_values(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.search.keywords.is_empty() {
            missing.push("KEYWORDS");
        }
        if self.ebay.enabled && self.ebay.oauth_token.is_empty() {
            missing.push("EBAY_OAUTH_TOKEN");
        }
        if self.whatsapp.access_token.is_empty() {
            missing.push("WHATSAPP_ACCESS_TOKEN");
        }
        if self.whatsapp.phone_number_id.is_empty() {
            missing.push("WHATSAPP_PHONE_NUMBER_ID");
        }
        if self.whatsapp.to_msisdn.is_empty() {
            missing.push("WHATSAPP_TO_MSISDN");
        }
        missing
    }
}
