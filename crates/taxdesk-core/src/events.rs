//! Domain events emitted by the record stores.
//!
//! Each event names the user who should hear about it and carries enough
//! context to build a human-readable title and body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AppointmentId, CaseId, DocumentId, UserId};
use crate::models::Message;

/// What happened to an appointment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentChange {
    /// Newly booked.
    Created,
    /// Time or details changed.
    Updated,
    /// Cancelled.
    Cancelled,
}

/// A "record created/updated" event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A message was stored.
    MessageCreated {
        /// The stored message.
        message: Message,
        /// Sender's display name.
        sender_name: String,
    },
    /// A tax case changed.
    CaseUpdated {
        /// The case.
        case_id: CaseId,
        /// The client who owns it.
        owner_id: UserId,
        /// New status label.
        status: String,
        /// Tax year covered.
        #[serde(default)]
        tax_year: Option<i32>,
    },
    /// A document was stored or attached.
    DocumentStored {
        /// The document.
        document_id: DocumentId,
        /// The client who owns it.
        owner_id: UserId,
        /// Original file name.
        file_name: String,
        /// Case it belongs to.
        #[serde(default)]
        case_id: Option<CaseId>,
    },
    /// An appointment was created or changed.
    AppointmentChanged {
        /// The appointment.
        appointment_id: AppointmentId,
        /// The client who owns it.
        owner_id: UserId,
        /// What happened.
        change: AppointmentChange,
        /// Scheduled time.
        #[serde(default)]
        scheduled_at: Option<DateTime<Utc>>,
    },
}

impl DomainEvent {
    /// The single user this event should be pushed to.
    pub fn recipient(&self) -> &UserId {
        match self {
            Self::MessageCreated { message, .. } => &message.recipient_id,
            Self::CaseUpdated { owner_id, .. }
            | Self::DocumentStored { owner_id, .. }
            | Self::AppointmentChanged { owner_id, .. } => owner_id,
        }
    }

    /// Event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageCreated { .. } => "message_created",
            Self::CaseUpdated { .. } => "case_updated",
            Self::DocumentStored { .. } => "document_stored",
            Self::AppointmentChanged { .. } => "appointment_changed",
        }
    }
}
