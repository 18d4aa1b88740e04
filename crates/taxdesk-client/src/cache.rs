//! Seams to the UI layer: cached queries to invalidate and alerts to show.

use parking_lot::Mutex;
use tracing::info;

/// A cached query the UI refetches when invalidated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The conversation list.
    Conversations,
    /// The unread-message badge.
    UnreadCount,
    /// The caller's own tax cases.
    MyCases,
    /// The staff view of all cases.
    AdminCases,
    /// The caller's own documents.
    MyDocuments,
    /// The staff view of all documents.
    AdminDocuments,
    /// The caller's own appointments.
    MyAppointments,
    /// The staff view of all appointments.
    AdminAppointments,
}

/// A transient alert for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    /// Payload tag it came from.
    pub kind: String,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
}

/// Marks cached queries stale.
pub trait CacheInvalidator: Send + Sync {
    /// Mark `key` stale.
    fn invalidate(&self, key: CacheKey);
}

/// Shows alerts.
pub trait AlertSink: Send + Sync {
    /// Show `alert`.
    fn alert(&self, alert: Alert);
}

/// In-memory invalidator that records every key in order.
#[derive(Debug, Default)]
pub struct RecordingCache {
    keys: Mutex<Vec<CacheKey>>,
}

impl RecordingCache {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys invalidated so far, in order.
    pub fn invalidated(&self) -> Vec<CacheKey> {
        self.keys.lock().clone()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.keys.lock().clear();
    }
}

impl CacheInvalidator for RecordingCache {
    fn invalidate(&self, key: CacheKey) {
        self.keys.lock().push(key);
    }
}

/// In-memory alert sink that records every alert in order.
#[derive(Debug, Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts shown so far, in order.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}

/// Alert sink that writes each alert to the log.
#[derive(Debug, Default)]
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn alert(&self, alert: Alert) {
        info!(kind = %alert.kind, title = %alert.title, "{}", alert.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_cache_keeps_order() {
        let cache = RecordingCache::new();
        cache.invalidate(CacheKey::UnreadCount);
        cache.invalidate(CacheKey::Conversations);
        assert_eq!(cache.invalidated(), vec![CacheKey::UnreadCount, CacheKey::Conversations]);
        cache.clear();
        assert!(cache.invalidated().is_empty());
    }

    #[test]
    fn recording_alerts() {
        let alerts = RecordingAlerts::new();
        alerts.alert(Alert {
            kind: "message".into(),
            title: "t".into(),
            message: "m".into(),
        });
        assert_eq!(alerts.alerts().len(), 1);
    }
}
