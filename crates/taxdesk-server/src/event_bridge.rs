//! Event bridge: feeds domain events from the bus into the dispatcher.

use std::sync::Arc;

use taxdesk_core::DomainEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::NotificationDispatcher;

/// Bridges the domain event bus to live push connections.
pub struct EventBridge {
    rx: broadcast::Receiver<DomainEvent>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl EventBridge {
    /// Create a new event bridge.
    pub fn new(rx: broadcast::Receiver<DomainEvent>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { rx, dispatcher }
    }

    /// Run the bridge loop. Exits when the bus closes or `cancel` fires.
    #[tracing::instrument(skip_all, name = "event_bridge")]
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = self.rx.recv() => received,
            };
            match received {
                Ok(event) => {
                    tracing::debug!(event = event.name(), "bridging event");
                    let _ = self.dispatcher.dispatch(&event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event bridge lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event bus closed, bridge exiting");
                    break;
                }
            }
        }
    }
}
