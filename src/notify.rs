//! Outbound event webhooks.
//!
//! When configured, streamgate emits conversion events on terminal payments
//! and a welcome event on first grant. Both are fire-and-forget: sent from a
//! spawned task with a short timeout and quick retries, so a slow or dead
//! sink can never stall a gateway callback.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;

/// Retry delays in milliseconds. Total worst case: 300ms.
const NOTIFY_RETRY_DELAYS: &[u64] = &[100, 200];

/// Conversion event payload for completed or failed purchases.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionEvent {
    /// "purchase_completed" or "purchase_failed"
    pub event: String,
    /// Order id doubles as the idempotency key; the sink deduplicates our
    /// retries on it
    pub order_id: String,
    pub plan: String,
    pub amount_cents: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Unix timestamp
    pub timestamp: i64,
}

/// Welcome event payload, emitted once per granted entitlement.
#[derive(Debug, Clone, Serialize)]
pub struct WelcomeEvent {
    pub user_id: String,
    pub plan: String,
    pub access_code: String,
    pub timestamp: i64,
}

/// Spawn a fire-and-forget conversion event.
///
/// If no sink is configured, this is a no-op. Panics in the spawned task are
/// logged rather than silently swallowed.
pub fn spawn_conversion_event(client: Client, url: Option<String>, event: ConversionEvent) {
    if let Some(url) = url {
        let event_type = event.event.clone();
        spawn_notify(client, url, event, event_type);
    }
}

/// Spawn a fire-and-forget welcome event.
pub fn spawn_welcome_event(client: Client, url: Option<String>, event: WelcomeEvent) {
    if let Some(url) = url {
        spawn_notify(client, url, event, "welcome".to_string());
    }
}

fn spawn_notify<T: Serialize + Send + Sync + 'static>(
    client: Client,
    url: String,
    event: T,
    event_type: String,
) {
    tokio::spawn(
        AssertUnwindSafe(async move {
            send_event(&client, &url, &event).await;
        })
        .catch_unwind()
        .map(move |result| {
            if let Err(panic) = result {
                let panic_msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    "Notify task panicked for event '{}': {}",
                    event_type,
                    panic_msg
                );
            }
        }),
    );
}

/// Send an event to the configured webhook URL with quick retries.
async fn send_event<T: Serialize>(client: &Client, url: &str, event: &T) {
    for (attempt, delay_ms) in std::iter::once(&0u64)
        .chain(NOTIFY_RETRY_DELAYS.iter())
        .enumerate()
    {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client
            .post(url)
            .json(event)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                if attempt > 0 {
                    tracing::debug!("Notify webhook succeeded after {} retries", attempt);
                }
                return;
            }
            Ok(resp) => {
                tracing::debug!("Notify webhook returned {}", resp.status());
            }
            Err(e) => {
                tracing::debug!("Notify webhook failed: {}", e);
            }
        }
    }

    tracing::warn!(
        "Notify webhook failed after {} attempts",
        NOTIFY_RETRY_DELAYS.len() + 1
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delays_are_quick() {
        // Total max wait must stay well under a webhook handler's budget
        let total_delay: u64 = NOTIFY_RETRY_DELAYS.iter().sum();
        assert!(total_delay < 500, "Retry delays should be quick");
    }

    #[test]
    fn test_conversion_event_serialization() {
        let event = ConversionEvent {
            event: "purchase_completed".to_string(),
            order_id: "ord_123".to_string(),
            plan: "monthly".to_string(),
            amount_cents: 10900,
            currency: "usd".to_string(),
            failure_reason: None,
            timestamp: 1234567890,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"purchase_completed\""));
        assert!(json.contains("\"order_id\":\"ord_123\""));
        assert!(!json.contains("failure_reason"));
    }

    #[test]
    fn test_failed_conversion_carries_reason() {
        let event = ConversionEvent {
            event: "purchase_failed".to_string(),
            order_id: "ord_456".to_string(),
            plan: "weekly".to_string(),
            amount_cents: 4900,
            currency: "usd".to_string(),
            failure_reason: Some("declined".to_string()),
            timestamp: 1234567890,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"failure_reason\":\"declined\""));
    }
}
