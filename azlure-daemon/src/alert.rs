//! Alert dispatch for newly recorded detection events.
//!
//! Duplicate events never reach this module -- the store's dedup key
//! already filtered them -- so every dispatched alert is a first sighting.
//!
//! # Channels
//!
//! * Structured log line (always available, on by default)
//! * Webhook POST with a JSON payload (optional, `[alerts].webhook_url`)
//!
//! Delivery failures are logged and never abort the ingestion loops.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use azlure_core::config::AlertsConfig;
use azlure_core::types::DetectionEvent;

/// Webhook payload shape.
///
/// Only redacted URIs are included; raw SAS parameters never leave the store.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: String,
    rule: &'a str,
    severity: String,
    event: WebhookEvent<'a>,
}

#[derive(Debug, Serialize)]
struct WebhookEvent<'a> {
    time: String,
    category: &'a str,
    operation: &'a str,
    request_uri: Option<&'a str>,
    caller_ip: Option<&'a str>,
    description: &'a str,
}

/// Dispatches alerts for newly recorded events.
pub struct AlertDispatcher {
    stdout: bool,
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl AlertDispatcher {
    /// Build a dispatcher from the `[alerts]` config section.
    pub fn from_config(config: &AlertsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.webhook_timeout_secs.max(1)))
            .build()
            .unwrap_or_default();

        Self {
            stdout: config.stdout,
            webhook_url: config.webhook_url.clone(),
            client,
        }
    }

    /// Consume the alert channel until all coordinator senders are dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<DetectionEvent>) {
        while let Some(event) = rx.recv().await {
            self.dispatch(&event).await;
        }
        tracing::debug!("alert channel drained, dispatcher exiting");
    }

    /// Deliver one alert over all configured channels.
    pub async fn dispatch(&self, event: &DetectionEvent) {
        if self.stdout {
            tracing::warn!(
                rule = %event.rule_id,
                severity = %event.severity,
                category = %event.category,
                occurred_at = %event.occurred_at.to_rfc3339(),
                caller_ip = event.caller_ip.as_deref().unwrap_or("-"),
                uri = event.request_uri.as_deref().unwrap_or("-"),
                "ALERT: {}",
                event.description,
            );
        }

        if let Some(ref url) = self.webhook_url {
            let payload = Self::payload(event);
            if let Err(e) = self.client.post(url).json(&payload).send().await {
                tracing::warn!(rule = %event.rule_id, error = %e, "webhook delivery failed");
            }
        }
    }

    fn payload(event: &DetectionEvent) -> WebhookPayload<'_> {
        WebhookPayload {
            text: format!("AzLure alert: {}", event.rule_id),
            rule: &event.rule_id,
            severity: event.severity.to_string(),
            event: WebhookEvent {
                time: event.occurred_at.to_rfc3339(),
                category: event.category.as_str(),
                operation: &event.operation,
                request_uri: event.request_uri.as_deref(),
                caller_ip: event.caller_ip.as_deref(),
                description: &event.description,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azlure_core::types::{Severity, SourceCategory};
    use chrono::{TimeZone, Utc};

    fn sample_event() -> DetectionEvent {
        DetectionEvent {
            rule_id: "decoy_credential_read".to_owned(),
            severity: Severity::High,
            category: SourceCategory::StorageRead,
            occurred_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            dedup_key: "ab".repeat(32),
            description: "decoy credential blob read".to_owned(),
            operation: "GetBlob".to_owned(),
            caller_ip: Some("203.0.113.7".to_owned()),
            request_uri: Some("/backup/credential?sig=REDACTED".to_owned()),
            object_id: "c/PT1H.json".to_owned(),
            first_seen: Some(Utc::now()),
        }
    }

    #[test]
    fn payload_serializes_with_redacted_uri() {
        let event = sample_event();
        let payload = AlertDispatcher::payload(&event);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("AzLure alert: decoy_credential_read"));
        assert!(json.contains("storage_read"));
        assert!(json.contains("sig=REDACTED"));
        assert!(json.contains("203.0.113.7"));
    }

    #[tokio::test]
    async fn run_exits_when_senders_drop() {
        let dispatcher = AlertDispatcher::from_config(&AlertsConfig {
            stdout: false,
            webhook_url: None,
            webhook_timeout_secs: 1,
        });
        let (tx, rx) = mpsc::channel(4);
        tx.send(sample_event()).await.unwrap();
        drop(tx);
        // run must return once the channel is drained and all senders are gone
        dispatcher.run(rx).await;
    }
}
