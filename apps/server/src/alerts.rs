//! Alert sink for the server: writes collector alerts to the structured log.

use holdwatch_core::alerts::{AlertSink, CollectorAlert};

#[derive(Clone, Default)]
pub struct LogAlertSink;

impl LogAlertSink {
    pub fn new() -> Self {
        Self
    }
}

impl AlertSink for LogAlertSink {
    fn emit(&self, alert: CollectorAlert) {
        let payload = serde_json::to_string(&alert).unwrap_or_default();
        match &alert {
            CollectorAlert::ParseFailureEscalated {
                key,
                consecutive_failures,
                reason,
            } => tracing::error!(
                alert = %payload,
                "Parse failures escalated for {}: {} in a row ({})",
                key,
                consecutive_failures,
                reason
            ),
            CollectorAlert::RetryExhausted {
                key,
                retry_count,
                reason,
            } => tracing::error!(
                alert = %payload,
                "Retries exhausted for {} after {} attempts: {}",
                key,
                retry_count,
                reason
            ),
            CollectorAlert::StaleUnitsReclaimed { keys } => tracing::error!(
                alert = %payload,
                "Reclaimed {} stale units",
                keys.len()
            ),
        }
    }
}
