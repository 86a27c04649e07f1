use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;

use crate::core::config::WhatsAppConfig;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification rejected: {status} - {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("notifier not configured: {0}")]
    NotConfigured(&'static str),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Sends plain text messages through the WhatsApp Cloud API.
pub struct WhatsAppNotifier {
    client: Client,
    config: WhatsAppConfig,
}

impl WhatsAppNotifier {
    pub fn new(config: WhatsAppConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/v17.0/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }

    fn recipient(&self) -> String {
        self.config.to_msisdn.replace('+', "")
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if self.config.access_token.is_empty() || self.config.phone_number_id.is_empty() {
            return Err(NotifyError::NotConfigured("WhatsApp access token or phone number id"));
        }

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": self.recipient(),
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text,
            },
        });

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("WhatsApp API error: {} - {}", status, body);
            return Err(NotifyError::Rejected { status, body });
        }

        tracing::info!("📨 Sent WhatsApp message to {}", self.config.to_msisdn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WhatsAppConfig {
        WhatsAppConfig {
            access_token: "token".to_string(),
            phone_number_id: "12345".to_string(),
            to_msisdn: "+447700900123".to_string(),
            api_base: "https://graph.facebook.com/".to_string(),
        }
    }

    #[test]
    fn test_message_url_and_recipient() {
        let notifier = WhatsAppNotifier::new(config(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            notifier.messages_url(),
            "https://graph.facebook.com/v17.0/12345/messages"
        );
        assert_eq!(notifier.recipient(), "447700900123");
    }

    #[tokio::test]
    async fn test_unconfigured_notifier_fails_fast() {
        let mut cfg = config();
        cfg.access_token.clear();
        let notifier = WhatsAppNotifier::new(cfg, Duration::from_secs(5)).unwrap();

        let err = notifier.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::NotConfigured(_)));
    }
}
