//! Branded string identifiers.
//!
//! Every record the subsystem touches is keyed by an opaque string. Wrapping
//! each kind in its own newtype keeps a `UserId` from being passed where a
//! `CaseId` is expected. Freshly minted ids are `<prefix>_<uuid v7>`, so they
//! sort by creation time; ids coming from the record store are taken verbatim
//! via `from_raw`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a new, time-ordered id.
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an existing id string.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Identity of a portal user (client, preparer, or admin).
    UserId,
    "usr"
);
branded_id!(
    /// Identity of a stored message.
    MessageId,
    "msg"
);
branded_id!(
    /// Identity of a tax case.
    CaseId,
    "case"
);
branded_id!(
    /// Identity of an uploaded document.
    DocumentId,
    "doc"
);
branded_id!(
    /// Identity of an appointment.
    AppointmentId,
    "appt"
);
branded_id!(
    /// Identity of one live push-channel connection.
    ConnectionId,
    "conn"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_has_prefix() {
        let id = UserId::new();
        assert!(id.as_str().starts_with("usr_"), "got: {id}");
    }

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn ids_are_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        let id = CaseId::new();
        let parsed: CaseId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_is_transparent() {
        let id = UserId::from_raw("42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");
        let back: UserId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn from_raw_preserves_value() {
        let id = DocumentId::from_raw("legacy-doc-7");
        assert_eq!(id.as_str(), "legacy-doc-7");
    }

    #[test]
    fn monotonic_ordering() {
        let ids: Vec<MessageId> = (0..100).map(|_| MessageId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0] < w[1], "not monotonic: {} >= {}", w[0], w[1]);
        }
    }
}
