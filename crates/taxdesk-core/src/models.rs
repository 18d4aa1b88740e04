//! Message and user records as the subsystem sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CaseId, MessageId, UserId};

/// Portal role of a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A taxpayer.
    Client,
    /// Staff member preparing returns.
    Preparer,
    /// Portal administrator.
    Admin,
}

impl Role {
    /// Whether this role belongs to staff (preparer or admin).
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Preparer | Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Preparer => write!(f, "preparer"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "preparer" => Ok(Self::Preparer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Display data for a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User identity.
    pub id: UserId,
    /// Name shown in conversation lists and notification titles.
    pub display_name: String,
    /// Portal role.
    pub role: Role,
}

/// A directed message between two users.
///
/// Everything except `is_read` is immutable once stored, and `is_read` only
/// ever moves from `false` to `true`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identity.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Addressee.
    pub recipient_id: UserId,
    /// Tax case the message refers to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<CaseId>,
    /// Message text.
    pub body: String,
    /// Whether the recipient has read it.
    pub is_read: bool,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The party on the other side of this message from `user`'s perspective,
    /// or `None` if `user` is neither sender nor recipient.
    pub fn counterpart_of(&self, user: &UserId) -> Option<&UserId> {
        if &self.recipient_id == user {
            Some(&self.sender_id)
        } else if &self.sender_id == user {
            Some(&self.recipient_id)
        } else {
            None
        }
    }

    /// Whether this message is an unread one addressed to `user`.
    pub fn is_unread_for(&self, user: &UserId) -> bool {
        &self.recipient_id == user && !self.is_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: &str, to: &str) -> Message {
        Message {
            id: MessageId::new(),
            sender_id: UserId::from_raw(from),
            recipient_id: UserId::from_raw(to),
            case_id: None,
            body: "hi".into(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counterpart_from_both_sides() {
        let m = msg("a", "b");
        assert_eq!(m.counterpart_of(&UserId::from_raw("a")).unwrap().as_str(), "b");
        assert_eq!(m.counterpart_of(&UserId::from_raw("b")).unwrap().as_str(), "a");
        assert!(m.counterpart_of(&UserId::from_raw("c")).is_none());
    }

    #[test]
    fn unread_only_for_recipient() {
        let m = msg("a", "b");
        assert!(m.is_unread_for(&UserId::from_raw("b")));
        assert!(!m.is_unread_for(&UserId::from_raw("a")));
    }

    #[test]
    fn role_roundtrip() {
        for role in [Role::Client, Role::Preparer, Role::Admin] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn staff_roles() {
        assert!(!Role::Client.is_staff());
        assert!(Role::Preparer.is_staff());
        assert!(Role::Admin.is_staff());
    }

    #[test]
    fn message_omits_missing_case() {
        let json = serde_json::to_value(msg("a", "b")).unwrap();
        assert!(json.get("case_id").is_none());
        assert_eq!(json["is_read"], false);
    }
}
