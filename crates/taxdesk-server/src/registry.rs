//! Connection registry: authenticated user id to live push connections.
//!
//! Admission, routing, and removal all go through one `RwLock` around the
//! map. Nothing inside the critical section performs I/O: delivery is a
//! non-blocking enqueue onto each connection's outbound queue, and closing
//! only signals the session task that owns the socket.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use taxdesk_auth::{AuthError, TokenVerifier};
use taxdesk_core::{Notification, UserId, close_code};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::metrics::{NOTIFICATIONS_DELIVERED_TOTAL, WS_SEND_DROPS_TOTAL};
use crate::websocket::connection::ClientConnection;

/// Why a transport was not admitted.
#[derive(Debug, thiserror::Error)]
pub enum AdmitError {
    /// The token did not resolve to a live identity.
    #[error("authentication rejected: {0}")]
    AuthRejected(#[from] AuthError),
    /// The user already holds the maximum number of connections.
    #[error("user {user_id} already holds {limit} connections")]
    LimitExceeded {
        /// The user.
        user_id: UserId,
        /// Configured limit.
        limit: usize,
    },
}

impl AdmitError {
    /// Close code to send on the refused transport.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::AuthRejected(_) => close_code::AUTH_REJECTED,
            Self::LimitExceeded { .. } => close_code::CONNECTION_LIMIT_EXCEEDED,
        }
    }

    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AuthRejected(_) => "auth",
            Self::LimitExceeded { .. } => "limit",
        }
    }
}

/// Registry of live push connections keyed by user.
pub struct ConnectionRegistry {
    verifier: Arc<dyn TokenVerifier>,
    connections: RwLock<HashMap<UserId, Vec<Arc<ClientConnection>>>>,
    max_per_user: usize,
}

impl ConnectionRegistry {
    /// Registry that authenticates with `verifier` and allows at most
    /// `max_per_user` concurrent connections per user.
    pub fn new(verifier: Arc<dyn TokenVerifier>, max_per_user: usize) -> Self {
        Self {
            verifier,
            connections: RwLock::new(HashMap::new()),
            max_per_user,
        }
    }

    /// Authenticate `token` and register a connection whose payloads are
    /// pushed into `tx`.
    ///
    /// On success the `connected` acknowledgment is already queued ahead of
    /// anything routed afterwards. On failure nothing is registered and the
    /// caller closes the transport with [`AdmitError::close_code`].
    pub fn admit(&self, token: &str, tx: mpsc::Sender<Arc<String>>) -> Result<Arc<ClientConnection>, AdmitError> {
        let identity = self.verifier.verify(token)?;
        let connection = Arc::new(ClientConnection::new(identity.user_id, tx));

        match Notification::connected().to_json() {
            Ok(json) => {
                let _ = connection.send(Arc::new(json));
            }
            Err(e) => warn!(error = %e, "failed to serialize connected payload"),
        }

        {
            let mut map = self.connections.write();
            let held = map.get(&connection.user_id).map_or(0, Vec::len);
            if held >= self.max_per_user {
                return Err(AdmitError::LimitExceeded {
                    user_id: connection.user_id.clone(),
                    limit: self.max_per_user,
                });
            }
            map.entry(connection.user_id.clone())
                .or_default()
                .push(connection.clone());
        }

        info!(user_id = %connection.user_id, connection_id = %connection.id, "connection admitted");
        Ok(connection)
    }

    /// Push a serialized payload to every live connection of `user_id`.
    ///
    /// Returns how many connections accepted it. A user with no connections
    /// is a silent no-op.
    pub fn route(&self, user_id: &UserId, payload: &Arc<String>) -> usize {
        let map = self.connections.read();
        let Some(conns) = map.get(user_id) else {
            debug!(user_id = %user_id, "no live connections, payload not pushed");
            return 0;
        };

        let mut delivered = 0;
        for conn in conns {
            if conn.send(payload.clone()) {
                delivered += 1;
            } else {
                counter!(WS_SEND_DROPS_TOTAL).increment(1);
                warn!(user_id = %user_id, connection_id = %conn.id, "outbound queue full or closed, payload dropped");
            }
        }
        counter!(NOTIFICATIONS_DELIVERED_TOTAL).increment(u64::try_from(delivered).unwrap_or(u64::MAX));
        delivered
    }

    /// Serialize `notification` once and route it to `user_id`.
    pub fn route_notification(&self, user_id: &UserId, notification: &Notification) -> usize {
        match notification.to_json() {
            Ok(json) => self.route(user_id, &Arc::new(json)),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "failed to serialize notification");
                0
            }
        }
    }

    /// Unregister `connection`. Returns `false` if it was not registered.
    pub fn remove(&self, connection: &ClientConnection) -> bool {
        let mut map = self.connections.write();
        let Some(conns) = map.get_mut(&connection.user_id) else {
            return false;
        };
        let before = conns.len();
        conns.retain(|c| c.id != connection.id);
        let removed = conns.len() < before;
        if conns.is_empty() {
            let _ = map.remove(&connection.user_id);
        }
        removed
    }

    /// Close every live connection of `user_id` with `code`.
    ///
    /// With [`close_code::AUTH_REJECTED`] the client stops reconnecting until
    /// it obtains a new token. Returns how many connections were signalled.
    pub fn disconnect_user(&self, user_id: &UserId, code: u16) -> usize {
        let map = self.connections.read();
        let conns = map.get(user_id).map_or(&[][..], Vec::as_slice);
        for conn in conns {
            conn.close(code);
        }
        if !conns.is_empty() {
            info!(user_id = %user_id, close_code = code, count = conns.len(), "disconnecting user");
        }
        conns.len()
    }

    /// Close every live connection with `code`.
    pub fn close_all(&self, code: u16) -> usize {
        let map = self.connections.read();
        let mut count = 0;
        for conn in map.values().flatten() {
            conn.close(code);
            count += 1;
        }
        count
    }

    /// Total live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().values().map(Vec::len).sum()
    }

    /// Users with at least one live connection.
    pub fn user_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Live connections held by `user_id`.
    pub fn connections_of(&self, user_id: &UserId) -> usize {
        self.connections.read().get(user_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use taxdesk_auth::Identity;
    use taxdesk_core::{NotificationKind, Role};

    /// Accepts tokens of the form `ok:<user id>`.
    struct PrefixVerifier;

    impl TokenVerifier for PrefixVerifier {
        fn verify(&self, token: &str) -> Result<Identity, AuthError> {
            token
                .strip_prefix("ok:")
                .map(|id| Identity {
                    user_id: UserId::from_raw(id),
                    role: Role::Client,
                })
                .ok_or_else(|| AuthError::Invalid("bad token".into()))
        }
    }

    fn registry(limit: usize) -> ConnectionRegistry {
        ConnectionRegistry::new(Arc::new(PrefixVerifier), limit)
    }

    fn admit(reg: &ConnectionRegistry, token: &str) -> (Result<Arc<ClientConnection>, AdmitError>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(16);
        (reg.admit(token, tx), rx)
    }

    fn uid(s: &str) -> UserId {
        UserId::from_raw(s)
    }

    #[tokio::test]
    async fn admitted_connection_gets_connected_first() {
        let reg = registry(5);
        let (conn, mut rx) = admit(&reg, "ok:alice");
        let conn = conn.unwrap();
        assert_eq!(conn.user_id.as_str(), "alice");
        let _ = reg.route(&uid("alice"), &Arc::new("later".into()));

        let first = Notification::parse(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first.kind(), Some(NotificationKind::Connected));
        assert_eq!(*rx.recv().await.unwrap(), "later");
    }

    #[test]
    fn invalid_token_is_never_registered() {
        let reg = registry(5);
        let (result, _rx) = admit(&reg, "forged");
        let err = result.unwrap_err();
        assert_eq!(err.close_code(), close_code::AUTH_REJECTED);
        assert_eq!(err.reason(), "auth");
        assert_eq!(reg.connection_count(), 0);
        assert_eq!(reg.route(&uid("forged"), &Arc::new("x".into())), 0);
    }

    #[test]
    fn limit_is_enforced_per_user() {
        let reg = registry(2);
        let (_a1, _r1) = admit(&reg, "ok:alice");
        let (_a2, _r2) = admit(&reg, "ok:alice");
        let (third, _r3) = admit(&reg, "ok:alice");
        let err = third.err().unwrap();
        assert_matches!(err, AdmitError::LimitExceeded { limit: 2, .. });
        assert_eq!(err.close_code(), close_code::CONNECTION_LIMIT_EXCEEDED);

        let (bob, _rb) = admit(&reg, "ok:bob");
        assert!(bob.is_ok());
        assert_eq!(reg.connections_of(&uid("alice")), 2);
        assert_eq!(reg.connection_count(), 3);
        assert_eq!(reg.user_count(), 2);
    }

    #[tokio::test]
    async fn route_reaches_every_connection_of_user_only() {
        let reg = registry(5);
        let (_a1, mut r1) = admit(&reg, "ok:alice");
        let (_a2, mut r2) = admit(&reg, "ok:alice");
        let (_b, mut rb) = admit(&reg, "ok:bob");
        for rx in [&mut r1, &mut r2, &mut rb] {
            let _ = rx.recv().await;
        }

        assert_eq!(reg.route(&uid("alice"), &Arc::new("hi".into())), 2);
        assert_eq!(*r1.recv().await.unwrap(), "hi");
        assert_eq!(*r2.recv().await.unwrap(), "hi");
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn route_to_offline_user_is_noop() {
        let reg = registry(5);
        let (_b, _rb) = admit(&reg, "ok:bob");
        assert_eq!(reg.route(&uid("ghost"), &Arc::new("x".into())), 0);
        assert_eq!(reg.connection_count(), 1);
    }

    #[test]
    fn full_queue_does_not_affect_other_users() {
        let reg = registry(5);
        let (tx, _slow_rx) = mpsc::channel(1);
        let _slow = reg.admit("ok:slow", tx).unwrap();
        let (_fast, _fast_rx) = admit(&reg, "ok:fast");

        // The slow queue already holds the connected payload.
        assert_eq!(reg.route(&uid("slow"), &Arc::new("x".into())), 0);
        assert_eq!(reg.route(&uid("fast"), &Arc::new("x".into())), 1);
    }

    #[test]
    fn remove_frees_a_slot() {
        let reg = registry(1);
        let (first, _r1) = admit(&reg, "ok:alice");
        let first = first.unwrap();
        assert!(reg.remove(&first));
        assert!(!reg.remove(&first));
        assert_eq!(reg.user_count(), 0);
        let (second, _r2) = admit(&reg, "ok:alice");
        assert!(second.is_ok());
    }

    #[test]
    fn disconnect_user_signals_only_that_user() {
        let reg = registry(5);
        let (a1, _r1) = admit(&reg, "ok:alice");
        let (a2, _r2) = admit(&reg, "ok:alice");
        let (b, _rb) = admit(&reg, "ok:bob");
        assert_eq!(reg.disconnect_user(&uid("alice"), close_code::AUTH_REJECTED), 2);
        assert_eq!(a1.unwrap().close_code(), Some(close_code::AUTH_REJECTED));
        assert_eq!(a2.unwrap().close_code(), Some(close_code::AUTH_REJECTED));
        assert!(!b.unwrap().is_closing());
        assert_eq!(reg.disconnect_user(&uid("nobody"), close_code::AUTH_REJECTED), 0);
    }

    #[test]
    fn close_all_signals_everyone() {
        let reg = registry(5);
        let (a, _ra) = admit(&reg, "ok:alice");
        let (b, _rb) = admit(&reg, "ok:bob");
        assert_eq!(reg.close_all(close_code::GOING_AWAY), 2);
        assert_eq!(a.unwrap().close_code(), Some(close_code::GOING_AWAY));
        assert_eq!(b.unwrap().close_code(), Some(close_code::GOING_AWAY));
    }

    #[test]
    fn concurrent_admission_respects_limit() {
        let reg = Arc::new(registry(3));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    let (tx, rx) = mpsc::channel(4);
                    reg.admit("ok:alice", tx).ok().map(|c| (c, rx))
                })
            })
            .collect();
        let admitted: Vec<_> = handles.into_iter().filter_map(|h| h.join().unwrap()).collect();
        assert_eq!(admitted.len(), 3);
        assert_eq!(reg.connections_of(&uid("alice")), 3);
    }
}
