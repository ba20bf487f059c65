//! Fire-and-forget webhook dispatch
//!
//! Events are posted as `{event, timestamp, data}` to every configured
//! endpoint. Dispatch never blocks a pipeline worker: each send runs in its
//! own task and failures are logged and dropped.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::json;

use voicegate_core::WebhookSink;

/// Webhook dispatcher over HTTP
pub struct WebhookDispatcher {
    client: Client,
    endpoints: Vec<String>,
}

impl WebhookDispatcher {
    pub fn new(endpoints: Vec<String>) -> Self {
        let endpoints = endpoints
            .into_iter()
            .filter(|url| {
                let ok = url.starts_with("http://") || url.starts_with("https://");
                if !ok {
                    tracing::warn!(%url, "ignoring invalid webhook url");
                }
                ok
            })
            .collect();
        Self {
            client: Client::new(),
            endpoints,
        }
    }

    /// A dispatcher with no endpoints; every event is a no-op
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }
}

impl WebhookSink for WebhookDispatcher {
    fn dispatch(&self, event: &str, data: serde_json::Value) {
        if self.endpoints.is_empty() {
            return;
        }
        let payload = json!({
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
            "data": data,
        });
        for url in &self.endpoints {
            let client = self.client.clone();
            let url = url.clone();
            let payload = payload.clone();
            let event = event.to_string();
            tokio::spawn(async move {
                let result = client
                    .post(&url)
                    .json(&payload)
                    .timeout(Duration::from_secs(10))
                    .send()
                    .await;
                match result {
                    Ok(response) => {
                        tracing::debug!(%event, %url, status = %response.status(), "webhook sent");
                    }
                    Err(e) => {
                        tracing::warn!(%event, %url, "webhook failed: {e}");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_urls_filtered() {
        let dispatcher = WebhookDispatcher::new(vec![
            "https://ok.test/hook".to_string(),
            "ftp://bad.test".to_string(),
            "not a url".to_string(),
        ]);
        assert_eq!(dispatcher.endpoints.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_dispatch_is_noop() {
        let dispatcher = WebhookDispatcher::disabled();
        dispatcher.dispatch("call.started", json!({"call_id": "x"}));
    }
}
