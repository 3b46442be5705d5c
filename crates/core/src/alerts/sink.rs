//! Alert sink trait and implementations.

use std::sync::{Arc, Mutex};

use super::CollectorAlert;

/// Receives collector alerts.
///
/// `emit()` is called inline from collection workers, so it must return
/// quickly and must not fail the unit that raised the alert.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: CollectorAlert);

    fn emit_batch(&self, alerts: Vec<CollectorAlert>) {
        for alert in alerts {
            self.emit(alert);
        }
    }
}

/// Discards every alert.
#[derive(Clone, Default)]
pub struct NoOpAlertSink;

impl AlertSink for NoOpAlertSink {
    fn emit(&self, _alert: CollectorAlert) {}
}

/// Collects alerts in memory for assertions.
#[derive(Clone, Default)]
pub struct MockAlertSink {
    alerts: Arc<Mutex<Vec<CollectorAlert>>>,
}

impl MockAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<CollectorAlert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().unwrap().is_empty()
    }
}

impl AlertSink for MockAlertSink {
    fn emit(&self, alert: CollectorAlert) {
        self.alerts.lock().unwrap().push(alert);
    }
}
