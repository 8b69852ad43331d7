use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChatSink, MessageKind};
use crate::config::NotificationsConfig;
use crate::utils::error::NotifyError;

/// Posts `{"text": ...}` payloads to chat webhooks.
pub struct WebhookNotifier {
    client: Client,
    store_url: Option<String>,
    summary_url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(config: &NotificationsConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            store_url: config.store_webhook_url.clone(),
            summary_url: config.summary_webhook_url.clone(),
        })
    }

    /// Summaries fall back to the store webhook when no dedicated one is set.
    fn url_for(&self, kind: MessageKind) -> Option<&str> {
        match kind {
            MessageKind::Store => self.store_url.as_deref(),
            MessageKind::Summary => self.summary_url.as_deref().or(self.store_url.as_deref()),
        }
    }

    fn create_payload(text: &str) -> serde_json::Value {
        json!({ "text": text })
    }

    async fn post_once(&self, url: &str, payload: &serde_json::Value) -> Result<(), NotifyError> {
        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatSink for WebhookNotifier {
    async fn send(&self, kind: MessageKind, text: &str) -> Result<(), NotifyError> {
        let Some(url) = self.url_for(kind) else {
            debug!(kind = %kind, "No webhook configured, message not sent");
            return Ok(());
        };

        let payload = Self::create_payload(text);
        match self.post_once(url, &payload).await {
            Ok(()) => {
                info!(kind = %kind, "Posted to webhook");
                Ok(())
            }
            Err(first) => {
                warn!(kind = %kind, error = %first, "Webhook post failed, retrying once");
                self.post_once(url, &payload).await
            }
        }
    }
}
