// Lazarus Alert Sink
//
// Alerts are keyed by dedupe key, last write wins. Resolving keeps the entry
// around with a resolution timestamp so history stays inspectable.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use lazarus_utils::alert::Alert;

/// Destination for operator alerts. Delivery failures are the sink's problem;
/// the recovery core never fails because an alert could not be raised.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn upsert_alert(&self, alert: Alert);

    async fn resolve_alert(&self, dedupe_key: &str);
}

/// In-process alert registry
#[derive(Debug, Default)]
pub struct AlertBook {
    alerts: Mutex<HashMap<String, Alert>>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn alerts_mut(&self) -> MutexGuard<'_, HashMap<String, Alert>> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All alerts, oldest raise first.
    pub fn alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.alerts_mut().values().cloned().collect();
        alerts.sort_by(|a, b| {
            a.raised_at
                .cmp(&b.raised_at)
                .then_with(|| a.dedupe_key.cmp(&b.dedupe_key))
        });
        alerts
    }

    pub fn open_alerts(&self) -> Vec<Alert> {
        self.alerts().into_iter().filter(Alert::is_open).collect()
    }

    pub fn get(&self, dedupe_key: &str) -> Option<Alert> {
        self.alerts_mut().get(dedupe_key).cloned()
    }
}

#[async_trait]
impl AlertSink for AlertBook {
    async fn upsert_alert(&self, alert: Alert) {
        self.alerts_mut().insert(alert.dedupe_key.clone(), alert);
    }

    async fn resolve_alert(&self, dedupe_key: &str) {
        if let Some(alert) = self.alerts_mut().get_mut(dedupe_key) {
            if alert.resolved_at.is_none() {
                alert.resolved_at = Some(Utc::now());
            }
        }
    }
}
