// crates/hodl-daemon/src/reporter.rs
//
// Error reporting sink. Every report is logged; when a webhook is
// configured, non-contention errors are also posted to it in the background.

use chrono::{DateTime, Utc};
use serde::Serialize;

use hodl_core::error::HodlError;
use hodl_core::traits::ErrorReporter;

/// Body posted to the report webhook.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub context: String,
    pub error: String,
    pub transient: bool,
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(context: &str, error: &HodlError, timestamp: DateTime<Utc>) -> Self {
        Self {
            context: context.to_string(),
            error: error.to_string(),
            transient: error.is_transient(),
            timestamp,
        }
    }
}

/// Whether an error is worth forwarding. Lock contention resolves itself on
/// the next attempt.
pub fn should_forward(error: &HodlError) -> bool {
    !matches!(error, HodlError::Contention(_))
}

/// `ErrorReporter` that logs and optionally forwards to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookReporter {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookReporter {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { url, client }
    }

    fn forward(&self, url: &str, report: ErrorReport) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("No async runtime available; error report not forwarded");
                return;
            }
        };
        let client = self.client.clone();
        let url = url.to_string();
        // Fire-and-forget: failures are logged, not propagated.
        handle.spawn(async move {
            match client.post(&url).json(&report).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::trace!("Error report delivered to {}", url);
                }
                Ok(resp) => {
                    tracing::warn!("Error report to {} returned status {}", url, resp.status());
                }
                Err(e) => {
                    tracing::warn!("Failed to deliver error report to {}: {}", url, e);
                }
            }
        });
    }
}

impl ErrorReporter for WebhookReporter {
    fn report(&self, context: &str, error: &HodlError) {
        tracing::error!(
            context,
            transient = error.is_transient(),
            "{}",
            error
        );
        if let Some(url) = &self.url {
            if should_forward(error) {
                self.forward(url, ErrorReport::new(context, error, Utc::now()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_report_body() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let report = ErrorReport::new("epoch_check", &HodlError::Oracle("timeout".into()), ts);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["context"], "epoch_check");
        assert_eq!(json["error"], "Balance oracle error: timeout");
        assert_eq!(json["transient"], true);
        assert_eq!(json["timestamp"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn test_contention_not_forwarded() {
        assert!(!should_forward(&HodlError::Contention("busy".into())));
        assert!(should_forward(&HodlError::Oracle("down".into())));
        assert!(should_forward(&HodlError::MissingEpoch(3)));
    }

    #[test]
    fn test_report_outside_runtime_does_not_panic() {
        let reporter = WebhookReporter::new(Some("http://127.0.0.1:9/errors".into()));
        reporter.report("test", &HodlError::NoCurrentEpoch);
        WebhookReporter::new(None).report("test", &HodlError::NoCurrentEpoch);
    }
}
