//! Inbound payload handling: what each tag invalidates and whether it alerts.

use taxdesk_core::{Notification, NotificationDetail};
use tracing::{debug, warn};

use crate::cache::{Alert, AlertSink, CacheInvalidator, CacheKey};

/// What one payload asks of the UI layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEffects {
    /// Cached queries to refetch.
    pub invalidate: &'static [CacheKey],
    /// Alert to show, if any.
    pub alert: Option<Alert>,
}

/// Map a notification to its invalidations and alert.
pub fn effects_for(notification: &Notification) -> InboundEffects {
    let invalidate: &'static [CacheKey] = match notification.detail {
        NotificationDetail::Connected | NotificationDetail::Unknown { .. } => &[],
        NotificationDetail::Message(_) => &[CacheKey::Conversations, CacheKey::UnreadCount],
        NotificationDetail::CaseUpdate(_) => &[CacheKey::MyCases, CacheKey::AdminCases],
        NotificationDetail::Document(_) => &[CacheKey::MyDocuments, CacheKey::AdminDocuments],
        NotificationDetail::Appointment(_) => &[CacheKey::MyAppointments, CacheKey::AdminAppointments],
    };
    let alert = match notification.detail {
        NotificationDetail::Connected => None,
        _ => Some(Alert {
            kind: notification.tag().to_owned(),
            title: notification.title.clone(),
            message: notification.message.clone(),
        }),
    };
    InboundEffects { invalidate, alert }
}

/// Parse one text frame and apply its effects.
///
/// A payload that fails to parse is logged and dropped; returns whether the
/// payload was applied.
pub fn handle_text(text: &str, cache: &dyn CacheInvalidator, alerts: &dyn AlertSink) -> bool {
    let notification = match Notification::parse(text) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "dropping malformed push payload");
            return false;
        }
    };
    debug!(tag = notification.tag(), "push payload received");

    let effects = effects_for(&notification);
    for key in effects.invalidate {
        cache.invalidate(*key);
    }
    if let Some(alert) = effects.alert {
        alerts.alert(alert);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{RecordingAlerts, RecordingCache};
    use serde_json::json;

    fn apply(payload: &serde_json::Value) -> (bool, RecordingCache, RecordingAlerts) {
        let cache = RecordingCache::new();
        let alerts = RecordingAlerts::new();
        let ok = handle_text(&payload.to_string(), &cache, &alerts);
        (ok, cache, alerts)
    }

    #[test]
    fn connected_does_nothing() {
        let (ok, cache, alerts) = apply(&json!({"type": "connected", "title": "Connected", "message": "ok"}));
        assert!(ok);
        assert!(cache.invalidated().is_empty());
        assert!(alerts.alerts().is_empty());
    }

    #[test]
    fn message_invalidates_conversations_and_badge() {
        let (ok, cache, alerts) = apply(&json!({
            "type": "message",
            "title": "New message from Pat",
            "message": "Please upload your W-2",
            "data": {"message_id": "msg_1", "sender_id": "usr_pat", "sender_name": "Pat"}
        }));
        assert!(ok);
        assert_eq!(cache.invalidated(), vec![CacheKey::Conversations, CacheKey::UnreadCount]);
        let shown = alerts.alerts();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "New message from Pat");
    }

    #[test]
    fn record_tags_invalidate_both_views() {
        let cases = [
            (
                json!({"type": "case_update", "title": "t", "message": "m", "data": {"case_id": "c", "status": "filed"}}),
                vec![CacheKey::MyCases, CacheKey::AdminCases],
            ),
            (
                json!({"type": "document", "title": "t", "message": "m", "data": {"document_id": "d", "file_name": "f.pdf"}}),
                vec![CacheKey::MyDocuments, CacheKey::AdminDocuments],
            ),
            (
                json!({"type": "appointment", "title": "t", "message": "m", "data": {"appointment_id": "a", "change": "created"}}),
                vec![CacheKey::MyAppointments, CacheKey::AdminAppointments],
            ),
        ];
        for (payload, expected) in cases {
            let (ok, cache, alerts) = apply(&payload);
            assert!(ok, "{payload}");
            assert_eq!(cache.invalidated(), expected);
            assert_eq!(alerts.alerts().len(), 1);
        }
    }

    #[test]
    fn unknown_tag_alerts_without_invalidating() {
        let (ok, cache, alerts) = apply(&json!({"type": "invoice", "title": "Invoice ready", "message": "Pay soon"}));
        assert!(ok);
        assert!(cache.invalidated().is_empty());
        assert_eq!(alerts.alerts()[0].kind, "invoice");
    }

    #[test]
    fn message_without_data_still_invalidates_and_alerts() {
        let (ok, cache, alerts) = apply(&json!({"type": "message", "title": "New message", "message": "hi"}));
        assert!(ok);
        assert_eq!(cache.invalidated(), vec![CacheKey::Conversations, CacheKey::UnreadCount]);
        assert_eq!(alerts.alerts().len(), 1);
        assert_eq!(alerts.alerts()[0].kind, "message");
    }

    #[test]
    fn case_update_with_partial_data_still_invalidates() {
        let (ok, cache, alerts) = apply(&json!({
            "type": "case_update", "title": "Tax case updated", "message": "m", "data": {"case_id": "c1"}
        }));
        assert!(ok);
        assert_eq!(cache.invalidated(), vec![CacheKey::MyCases, CacheKey::AdminCases]);
        assert_eq!(alerts.alerts().len(), 1);
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        let cache = RecordingCache::new();
        let alerts = RecordingAlerts::new();
        assert!(!handle_text("not json", &cache, &alerts));
        assert!(!handle_text(r#"["message"]"#, &cache, &alerts));
        assert!(!handle_text(r#"{"type":"message","message":"m"}"#, &cache, &alerts));
        assert!(cache.invalidated().is_empty());
        assert!(alerts.alerts().is_empty());
    }
}
