//! One live push-channel connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use taxdesk_core::{ConnectionId, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// An authenticated push-channel connection.
///
/// Outbound payloads go through a bounded queue drained by the session's
/// writer task, so enqueueing never blocks. A server-side close is requested
/// with [`close`](Self::close); the writer sends the close frame.
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Authenticated owner.
    pub user_id: UserId,
    tx: mpsc::Sender<Arc<String>>,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
    close_requested: CancellationToken,
    close_code: Mutex<Option<u16>>,
}

impl ClientConnection {
    /// Create a new connection for `user_id`.
    pub fn new(user_id: UserId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id,
            tx,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
            dropped_messages: AtomicU64::new(0),
            close_requested: CancellationToken::new(),
            close_code: Mutex::new(None),
        }
    }

    /// Enqueue a text payload.
    ///
    /// Returns `false` if the queue is full or closed, and increments the
    /// dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total payloads dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Ask the session to close the transport with `code`.
    ///
    /// The first requested code wins; later calls are no-ops.
    pub fn close(&self, code: u16) {
        {
            let mut current = self.close_code.lock();
            if current.is_none() {
                *current = Some(code);
            }
        }
        self.close_requested.cancel();
    }

    /// The close code requested so far, if any.
    pub fn close_code(&self) -> Option<u16> {
        *self.close_code.lock()
    }

    /// Whether a close has been requested.
    pub fn is_closing(&self) -> bool {
        self.close_requested.is_cancelled()
    }

    /// Resolves once a close has been requested.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close_requested.cancelled()
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or admission).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (ClientConnection::new(UserId::from_raw("usr_1"), tx), rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection();
        assert!(conn.id.as_str().starts_with("conn_"));
        assert_eq!(conn.user_id.as_str(), "usr_1");
        assert!(conn.is_alive.load(Ordering::Relaxed));
        assert!(!conn.is_closing());
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let (conn, mut rx) = make_connection();
        for i in 0..5 {
            assert!(conn.send(Arc::new(format!("msg_{i}"))));
        }
        for i in 0..5 {
            assert_eq!(*rx.recv().await.unwrap(), format!("msg_{i}"));
        }
    }

    #[tokio::test]
    async fn send_to_closed_channel_returns_false() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(UserId::from_raw("usr_2"), tx);
        assert!(conn.send(Arc::new("msg1".into())));
        assert!(!conn.send(Arc::new("msg2".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection();
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn first_close_code_wins() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.close_code(), None);
        conn.close(4001);
        conn.close(1001);
        assert!(conn.is_closing());
        assert_eq!(conn.close_code(), Some(4001));
    }

    #[tokio::test]
    async fn closed_future_resolves_after_close() {
        let (conn, _rx) = make_connection();
        let conn = Arc::new(conn);
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move {
                conn.closed().await;
                conn.close_code()
            })
        };
        conn.close(4003);
        assert_eq!(waiter.await.unwrap(), Some(4003));
    }

    #[test]
    fn connection_ids_unique() {
        let (a, _ra) = make_connection();
        let (b, _rb) = make_connection();
        assert_ne!(a.id, b.id);
    }
}
