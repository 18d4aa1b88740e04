//! Push-channel session lifecycle: one socket from upgrade through close.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use taxdesk_core::close_code;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::metrics::{
    WS_ADMISSIONS_REJECTED_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
};
use crate::server::AppState;

use super::connection::ClientConnection;

/// How long cleanup waits for the writer to flush its close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run a push-channel session for a freshly upgraded socket.
///
/// 1. Admits the token through the registry, or closes with 4001/4002
/// 2. Forwards queued payloads, pings on the heartbeat interval, and closes
///    with 1001 when the client stops answering
/// 3. Closes with 4003 when an inbound frame exceeds the size limit
/// 4. Unregisters the connection on every exit path
#[instrument(skip_all)]
pub async fn run_ws_session(socket: WebSocket, token: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(state.config.send_queue_capacity.max(1));

    let connection = match state.registry.admit(&token, send_tx) {
        Ok(conn) => conn,
        Err(e) => {
            counter!(WS_ADMISSIONS_REJECTED_TOTAL, "reason" => e.reason()).increment(1);
            info!(reason = e.reason(), error = %e, "push connection refused");
            let _ = ws_tx.send(close_message(e.close_code())).await;
            return;
        }
    };

    // Admitted after close_all ran; the writer sends 1001 straight away.
    if state.shutdown.is_shutting_down() {
        connection.close(close_code::GOING_AWAY);
    }

    let connection_start = Instant::now();
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut writer = tokio::spawn(run_writer(
        ws_tx,
        send_rx,
        connection.clone(),
        state.config.heartbeat_interval(),
        state.config.heartbeat_timeout(),
    ));

    let max_size = state.config.max_message_size;
    loop {
        let frame = tokio::select! {
            () = connection.closed() => break,
            frame = ws_rx.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "push channel read error");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        match msg {
            Message::Text(ref text) if text.len() > max_size => {
                warn!(len = text.len(), max_size, "inbound frame too large");
                connection.close(close_code::MESSAGE_TOO_LARGE);
            }
            Message::Binary(ref data) if data.len() > max_size => {
                warn!(len = data.len(), max_size, "inbound frame too large");
                connection.close(close_code::MESSAGE_TOO_LARGE);
            }
            Message::Text(_) | Message::Binary(_) => {
                debug!("ignoring inbound frame on push-only channel");
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(frame) => {
                debug!(code = frame.as_ref().map(|f| f.code), "client sent close frame");
                break;
            }
        }
    }

    let _ = state.registry.remove(&connection);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    info!(
        user_id = %connection.user_id,
        connection_id = %connection.id,
        close_code = connection.close_code(),
        dropped = connection.drop_count(),
        "push connection closed"
    );

    // No-op if a code was already requested; otherwise stops the writer.
    connection.close(close_code::GOING_AWAY);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!("writer did not finish in time");
        writer.abort();
    }
}

/// Outbound half: queued payloads, heartbeat pings, and the close frame.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
) {
    let mut ping_interval = tokio::time::interval(heartbeat_interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;
            msg = send_rx.recv() => {
                let Some(text) = msg else { break };
                if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                    connection.close(close_code::GOING_AWAY);
                    break;
                }
            }
            () = connection.closed() => {
                let code = connection.close_code().unwrap_or(close_code::GOING_AWAY);
                let _ = ws_tx.send(close_message(code)).await;
                break;
            }
            _ = ping_interval.tick() => {
                if !connection.check_alive() && connection.last_pong_elapsed() > heartbeat_timeout {
                    warn!(user_id = %connection.user_id, "client unresponsive for {heartbeat_timeout:?}, disconnecting");
                    connection.close(close_code::GOING_AWAY);
                    continue;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    connection.close(close_code::GOING_AWAY);
                    break;
                }
            }
        }
    }
}

fn close_message(code: u16) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(close_code::reason(code)),
    }))
}
