//! Domain events to typed notification payloads.
//!
//! Dispatch is fire-and-forget: it never fails the write that produced the
//! event. An offline recipient, a full queue, or a serialization failure is
//! logged and otherwise ignored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use taxdesk_core::events::AppointmentChange;
use taxdesk_core::notification::{AppointmentData, CaseData, DocumentData, MessageData};
use taxdesk_core::{DomainEvent, Notification, NotificationDetail};
use tracing::{debug, instrument};

use crate::metrics::NOTIFICATIONS_DISPATCHED_TOTAL;
use crate::registry::ConnectionRegistry;

/// Longest message excerpt pushed in a notification body, in characters.
pub const EXCERPT_CHARS: usize = 100;

/// Turns domain events into notifications and hands them to the registry.
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl NotificationDispatcher {
    /// Dispatcher delivering through `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Push the notification for `event` to its single recipient.
    ///
    /// Returns how many live connections received it.
    #[instrument(skip_all, fields(event = event.name(), user_id = %event.recipient()))]
    pub fn dispatch(&self, event: &DomainEvent) -> usize {
        let notification = build_notification(event);
        counter!(NOTIFICATIONS_DISPATCHED_TOTAL, "kind" => notification.tag().to_owned()).increment(1);
        let delivered = self.registry.route_notification(event.recipient(), &notification);
        debug!(delivered, "notification dispatched");
        delivered
    }
}

/// The notification a recipient sees for `event`.
pub fn build_notification(event: &DomainEvent) -> Notification {
    match event {
        DomainEvent::MessageCreated { message, sender_name } => Notification {
            title: format!("New message from {sender_name}"),
            message: excerpt(&message.body, EXCERPT_CHARS),
            detail: NotificationDetail::Message(Some(MessageData {
                message_id: message.id.clone(),
                sender_id: message.sender_id.clone(),
                sender_name: sender_name.clone(),
                case_id: message.case_id.clone(),
            })),
        },
        DomainEvent::CaseUpdated {
            case_id,
            status,
            tax_year,
            ..
        } => {
            let label = status.replace('_', " ");
            Notification {
                title: "Tax case updated".into(),
                message: match tax_year {
                    Some(year) => format!("Your {year} tax case is now {label}"),
                    None => format!("Your tax case is now {label}"),
                },
                detail: NotificationDetail::CaseUpdate(Some(CaseData {
                    case_id: case_id.clone(),
                    status: status.clone(),
                    tax_year: *tax_year,
                })),
            }
        }
        DomainEvent::DocumentStored {
            document_id,
            file_name,
            case_id,
            ..
        } => Notification {
            title: "Document received".into(),
            message: format!("{file_name} was added to your documents"),
            detail: NotificationDetail::Document(Some(DocumentData {
                document_id: document_id.clone(),
                file_name: file_name.clone(),
                case_id: case_id.clone(),
            })),
        },
        DomainEvent::AppointmentChanged {
            appointment_id,
            change,
            scheduled_at,
            ..
        } => {
            let (title, verb) = match change {
                AppointmentChange::Created => ("Appointment scheduled", "is scheduled"),
                AppointmentChange::Updated => ("Appointment updated", "was moved"),
                AppointmentChange::Cancelled => ("Appointment cancelled", "was cancelled"),
            };
            let message = match (change, scheduled_at) {
                (AppointmentChange::Cancelled, _) | (_, None) => format!("Your appointment {verb}"),
                (_, Some(at)) => format!("Your appointment {verb} for {}", format_when(at)),
            };
            Notification {
                title: title.into(),
                message,
                detail: NotificationDetail::Appointment(Some(AppointmentData {
                    appointment_id: appointment_id.clone(),
                    change: *change,
                    scheduled_at: *scheduled_at,
                })),
            }
        }
    }
}

/// First `max_chars` characters of `text` with whitespace collapsed, plus an
/// ellipsis when truncated.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

fn format_when(at: &DateTime<Utc>) -> String {
    at.format("%b %-d, %Y at %H:%M UTC").to_string()
}
