//! Notification payloads pushed over the channel.
//!
//! On the wire every payload is a flat JSON object:
//!
//! ```json
//! { "type": "message", "title": "...", "message": "...", "data": { ... } }
//! ```
//!
//! In memory it is the [`Notification`] struct whose [`NotificationDetail`]
//! is a sum type over the known tags plus an explicit `Unknown` variant, so
//! both ends match exhaustively and a newer server never breaks an older
//! client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::AppointmentChange;
use crate::ids::{AppointmentId, CaseId, DocumentId, MessageId, UserId};

/// Tags understood by this version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// New message addressed to the user.
    Message,
    /// A tax case owned by the user changed.
    CaseUpdate,
    /// A document was stored or attached.
    Document,
    /// An appointment was created or changed.
    Appointment,
    /// Liveness acknowledgment sent right after admission.
    Connected,
}

impl NotificationKind {
    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::CaseUpdate => "case_update",
            Self::Document => "document",
            Self::Appointment => "appointment",
            Self::Connected => "connected",
        }
    }

    /// Parse a wire tag; `None` for tags this version does not know.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "message" => Some(Self::Message),
            "case_update" => Some(Self::CaseUpdate),
            "document" => Some(Self::Document),
            "appointment" => Some(Self::Appointment),
            "connected" => Some(Self::Connected),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data carried by a `message` notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    /// The stored message.
    pub message_id: MessageId,
    /// Who sent it.
    pub sender_id: UserId,
    /// Sender's display name at dispatch time.
    pub sender_name: String,
    /// Related case, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<CaseId>,
}

/// Data carried by a `case_update` notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseData {
    /// The case that changed.
    pub case_id: CaseId,
    /// New status label.
    pub status: String,
    /// Tax year the case covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_year: Option<i32>,
}

/// Data carried by a `document` notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentData {
    /// The stored document.
    pub document_id: DocumentId,
    /// Original file name.
    pub file_name: String,
    /// Case it is attached to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<CaseId>,
}

/// Data carried by an `appointment` notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentData {
    /// The appointment.
    pub appointment_id: AppointmentId,
    /// What happened to it.
    pub change: AppointmentChange,
    /// When it is scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Tag-specific part of a notification.
///
/// The data bag is optional on the wire. A known tag whose bag is absent or
/// does not match the expected shape still classifies by tag, with `None`
/// as its data.
#[derive(Clone, Debug, PartialEq)]
pub enum NotificationDetail {
    /// Liveness acknowledgment; carries nothing actionable.
    Connected,
    /// New message.
    Message(Option<MessageData>),
    /// Case change.
    CaseUpdate(Option<CaseData>),
    /// Document stored.
    Document(Option<DocumentData>),
    /// Appointment change.
    Appointment(Option<AppointmentData>),
    /// A tag this version does not know.
    Unknown {
        /// The raw tag.
        kind: String,
        /// Raw data bag, if present.
        data: Option<Value>,
    },
}

/// A typed notification.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Short title.
    pub title: String,
    /// Human-readable body.
    pub message: String,
    /// Tag and tag-specific data.
    pub detail: NotificationDetail,
}

/// Flat wire form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    /// Tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Short title.
    pub title: String,
    /// Human-readable body.
    pub message: String,
    /// Tag-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Why an inbound payload could not be turned into a [`Notification`].
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Not JSON, or not the flat payload shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Notification {
    /// Liveness acknowledgment sent after admission.
    pub fn connected() -> Self {
        Self {
            title: "Connected".into(),
            message: "Real-time notifications are active".into(),
            detail: NotificationDetail::Connected,
        }
    }

    /// The known tag, or `None` for `Unknown`.
    pub fn kind(&self) -> Option<NotificationKind> {
        match &self.detail {
            NotificationDetail::Connected => Some(NotificationKind::Connected),
            NotificationDetail::Message(_) => Some(NotificationKind::Message),
            NotificationDetail::CaseUpdate(_) => Some(NotificationKind::CaseUpdate),
            NotificationDetail::Document(_) => Some(NotificationKind::Document),
            NotificationDetail::Appointment(_) => Some(NotificationKind::Appointment),
            NotificationDetail::Unknown { .. } => None,
        }
    }

    /// Wire tag, including unknown ones.
    pub fn tag(&self) -> &str {
        match &self.detail {
            NotificationDetail::Unknown { kind, .. } => kind,
            _ => self.kind().map_or("", NotificationKind::as_str),
        }
    }

    /// Convert to the flat wire form.
    pub fn to_wire(&self) -> Result<WirePayload, serde_json::Error> {
        let data = match &self.detail {
            NotificationDetail::Connected => None,
            NotificationDetail::Message(d) => d.as_ref().map(serde_json::to_value).transpose()?,
            NotificationDetail::CaseUpdate(d) => d.as_ref().map(serde_json::to_value).transpose()?,
            NotificationDetail::Document(d) => d.as_ref().map(serde_json::to_value).transpose()?,
            NotificationDetail::Appointment(d) => d.as_ref().map(serde_json::to_value).transpose()?,
            NotificationDetail::Unknown { data, .. } => data.clone(),
        };
        Ok(WirePayload {
            kind: self.tag().to_owned(),
            title: self.title.clone(),
            message: self.message.clone(),
            data,
        })
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_wire()?)
    }

    /// Parse JSON text received from the channel.
    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let wire: WirePayload = serde_json::from_str(text)?;
        Ok(Self::from(wire))
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: Option<Value>) -> Option<T> {
    data.and_then(|v| serde_json::from_value(v).ok())
}

impl From<WirePayload> for Notification {
    fn from(wire: WirePayload) -> Self {
        let detail = match NotificationKind::from_tag(&wire.kind) {
            Some(NotificationKind::Connected) => NotificationDetail::Connected,
            Some(NotificationKind::Message) => NotificationDetail::Message(decode(wire.data)),
            Some(NotificationKind::CaseUpdate) => NotificationDetail::CaseUpdate(decode(wire.data)),
            Some(NotificationKind::Document) => NotificationDetail::Document(decode(wire.data)),
            Some(NotificationKind::Appointment) => NotificationDetail::Appointment(decode(wire.data)),
            None => NotificationDetail::Unknown {
                kind: wire.kind,
                data: wire.data,
            },
        };
        Self {
            title: wire.title,
            message: wire.message,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn message_notification() -> Notification {
        Notification {
            title: "New message from Dana".into(),
            message: "Your W-2 looks fine".into(),
            detail: NotificationDetail::Message(Some(MessageData {
                message_id: MessageId::from_raw("msg_1"),
                sender_id: UserId::from_raw("usr_dana"),
                sender_name: "Dana".into(),
                case_id: None,
            })),
        }
    }

    #[test]
    fn wire_shape_is_flat() {
        let json: Value = serde_json::from_str(&message_notification().to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["title"], "New message from Dana");
        assert_eq!(json["message"], "Your W-2 looks fine");
        assert_eq!(json["data"]["sender_id"], "usr_dana");
        assert!(json["data"].get("case_id").is_none());
    }

    #[test]
    fn connected_has_no_data() {
        let json: Value = serde_json::from_str(&Notification::connected().to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "connected");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn parse_message_payload() {
        let text = message_notification().to_json().unwrap();
        let parsed = Notification::parse(&text).unwrap();
        assert_eq!(parsed, message_notification());
        assert_eq!(parsed.kind(), Some(NotificationKind::Message));
    }

    #[test]
    fn parse_case_update() {
        let text = json!({
            "type": "case_update",
            "title": "Case updated",
            "message": "Your 2024 return is now in review",
            "data": { "case_id": "case_9", "status": "in_review", "tax_year": 2024 }
        })
        .to_string();
        let parsed = Notification::parse(&text).unwrap();
        assert_matches!(parsed.detail, NotificationDetail::CaseUpdate(Some(ref d)) if d.tax_year == Some(2024));
    }

    #[test]
    fn unknown_tag_is_preserved() {
        let text = json!({
            "type": "invoice",
            "title": "Invoice ready",
            "message": "Pay by Friday",
            "data": { "amount": 120 }
        })
        .to_string();
        let parsed = Notification::parse(&text).unwrap();
        assert_eq!(parsed.kind(), None);
        assert_eq!(parsed.tag(), "invoice");
        assert_matches!(parsed.detail, NotificationDetail::Unknown { ref data, .. } if data.as_ref().unwrap()["amount"] == 120);
    }

    #[test]
    fn connected_ignores_extra_data() {
        let text = json!({
            "type": "connected", "title": "t", "message": "m", "data": { "connection_id": "conn_1" }
        })
        .to_string();
        assert_eq!(Notification::parse(&text).unwrap().detail, NotificationDetail::Connected);
    }

    #[test]
    fn not_json_is_malformed() {
        assert_matches!(Notification::parse("not json"), Err(PayloadError::Malformed(_)));
    }

    #[test]
    fn missing_title_is_malformed() {
        let text = json!({ "type": "message", "message": "m" }).to_string();
        assert_matches!(Notification::parse(&text), Err(PayloadError::Malformed(_)));
    }

    #[test]
    fn known_tag_without_data_keeps_its_tag() {
        let text = json!({ "type": "message", "title": "New message", "message": "hi" }).to_string();
        let parsed = Notification::parse(&text).unwrap();
        assert_eq!(parsed.kind(), Some(NotificationKind::Message));
        assert_eq!(parsed.detail, NotificationDetail::Message(None));
        assert!(parsed.to_wire().unwrap().data.is_none());
    }

    #[test]
    fn partial_data_keeps_its_tag() {
        let text = json!({ "type": "case_update", "title": "t", "message": "m", "data": { "case_id": "c1" } })
            .to_string();
        let parsed = Notification::parse(&text).unwrap();
        assert_eq!(parsed.detail, NotificationDetail::CaseUpdate(None));

        let text = json!({ "type": "appointment", "title": "t", "message": "m", "data": { "x": 1 } })
            .to_string();
        assert_eq!(Notification::parse(&text).unwrap().kind(), Some(NotificationKind::Appointment));
    }

    #[test]
    fn bad_body_is_malformed_but_odd_data_is_tolerated() {
        let text = json!({ "type": "document", "title": "t", "message": 5 }).to_string();
        assert_matches!(Notification::parse(&text), Err(PayloadError::Malformed(_)));
        let text = json!({ "type": "document", "title": "t", "message": "m", "data": "oops" }).to_string();
        assert_eq!(Notification::parse(&text).unwrap().detail, NotificationDetail::Document(None));
    }

    #[test]
    fn tags_roundtrip() {
        for kind in [
            NotificationKind::Message,
            NotificationKind::CaseUpdate,
            NotificationKind::Document,
            NotificationKind::Appointment,
            NotificationKind::Connected,
        ] {
            assert_eq!(NotificationKind::from_tag(kind.as_str()), Some(kind));
        }
    }
}
