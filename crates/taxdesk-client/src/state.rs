//! The push-channel connection state machine.
//!
//! ```text
//! Idle ──token──▶ Connecting ──opened──▶ Open
//!                     ▲                   │
//!                     └──timer── ClosedRetryable ◀──closed (not 4001)
//!                                                   │
//!                         ClosedTerminal ◀──closed (4001)
//! ```
//!
//! The machine is pure: [`ChannelMachine::handle`] takes an event and returns
//! the effects the driver must perform. It never touches a socket or a timer.

use std::time::Duration;

use taxdesk_core::close_code;
use tracing::debug;

/// Where the channel is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// No token, or torn down.
    Idle,
    /// A transport is being opened.
    Connecting,
    /// The transport is open.
    Open,
    /// Closed transiently; a reconnect is scheduled.
    ClosedRetryable,
    /// Closed by auth rejection; waits for a fresh token.
    ClosedTerminal,
}

/// Something that happened to the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The auth layer produced a token.
    TokenAvailable(String),
    /// The user logged out.
    TokenCleared,
    /// The transport finished its handshake.
    TransportOpened,
    /// The transport closed or failed to open. `None` means no close frame.
    TransportClosed {
        /// Close code, if a close frame arrived.
        code: Option<u16>,
    },
    /// The reconnect delay elapsed.
    ReconnectTimerFired,
    /// Unmount: stop everything.
    Teardown,
}

/// Work the driver must do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Open a transport with this token.
    OpenTransport {
        /// Bearer token for the handshake.
        token: String,
    },
    /// Fire [`ChannelEvent::ReconnectTimerFired`] after this delay.
    ScheduleReconnect(Duration),
    /// Drop any pending reconnect timer.
    CancelReconnect,
    /// Close the transport if one is open or opening.
    CloseTransport,
}

/// Pure connection state machine.
#[derive(Debug)]
pub struct ChannelMachine {
    state: ChannelState,
    token: Option<String>,
    rejected_token: Option<String>,
    reconnect_pending: bool,
    reconnect_delay: Duration,
}

impl ChannelMachine {
    /// Idle machine that waits `reconnect_delay` after a retryable closure.
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: ChannelState::Idle,
            token: None,
            rejected_token: None,
            reconnect_pending: false,
            reconnect_delay,
        }
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether a reconnect timer is outstanding.
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Apply `event` and return the effects to perform, in order.
    pub fn handle(&mut self, event: ChannelEvent) -> Vec<Effect> {
        let before = self.state;
        let effects = match event {
            ChannelEvent::TokenAvailable(token) => self.on_token(token),
            ChannelEvent::TokenCleared => {
                self.token = None;
                self.rejected_token = None;
                self.stop()
            }
            ChannelEvent::TransportOpened => self.on_opened(),
            ChannelEvent::TransportClosed { code } => self.on_closed(code),
            ChannelEvent::ReconnectTimerFired => self.on_timer(),
            ChannelEvent::Teardown => self.stop(),
        };
        if before != self.state {
            debug!(from = ?before, to = ?self.state, "channel state changed");
        }
        effects
    }

    fn on_token(&mut self, token: String) -> Vec<Effect> {
        if token.is_empty() {
            return Vec::new();
        }
        self.token = Some(token.clone());
        match self.state {
            ChannelState::Idle => self.connect(token),
            ChannelState::ClosedTerminal if self.rejected_token.as_deref() != Some(token.as_str()) => {
                self.rejected_token = None;
                self.connect(token)
            }
            // Connecting/Open keep their transport; the new token is used on
            // the next connect. A pending reconnect picks it up too.
            _ => Vec::new(),
        }
    }

    fn on_opened(&mut self) -> Vec<Effect> {
        if self.state != ChannelState::Connecting {
            return Vec::new();
        }
        self.state = ChannelState::Open;
        self.cancel_reconnect()
    }

    fn on_closed(&mut self, code: Option<u16>) -> Vec<Effect> {
        if !matches!(self.state, ChannelState::Connecting | ChannelState::Open) {
            return Vec::new();
        }
        if !close_code::is_retryable(code) {
            self.state = ChannelState::ClosedTerminal;
            self.rejected_token = self.token.clone();
            return self.cancel_reconnect();
        }
        if self.token.is_none() {
            self.state = ChannelState::Idle;
            return Vec::new();
        }
        self.state = ChannelState::ClosedRetryable;
        self.reconnect_pending = true;
        vec![Effect::ScheduleReconnect(self.reconnect_delay)]
    }

    fn on_timer(&mut self) -> Vec<Effect> {
        self.reconnect_pending = false;
        if self.state != ChannelState::ClosedRetryable {
            return Vec::new();
        }
        match self.token.clone() {
            Some(token) => self.connect(token),
            None => {
                self.state = ChannelState::Idle;
                Vec::new()
            }
        }
    }

    fn connect(&mut self, token: String) -> Vec<Effect> {
        self.state = ChannelState::Connecting;
        let mut effects = self.cancel_reconnect();
        effects.push(Effect::OpenTransport { token });
        effects
    }

    fn cancel_reconnect(&mut self) -> Vec<Effect> {
        if std::mem::take(&mut self.reconnect_pending) {
            vec![Effect::CancelReconnect]
        } else {
            Vec::new()
        }
    }

    fn stop(&mut self) -> Vec<Effect> {
        let mut effects = self.cancel_reconnect();
        if matches!(self.state, ChannelState::Connecting | ChannelState::Open) {
            effects.push(Effect::CloseTransport);
        }
        self.state = ChannelState::Idle;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxdesk_core::close_code::{AUTH_REJECTED, CONNECTION_LIMIT_EXCEEDED, GOING_AWAY};

    const DELAY: Duration = Duration::from_secs(5);

    fn open_machine() -> ChannelMachine {
        let mut m = ChannelMachine::new(DELAY);
        let _ = m.handle(ChannelEvent::TokenAvailable("t1".into()));
        let _ = m.handle(ChannelEvent::TransportOpened);
        assert_eq!(m.state(), ChannelState::Open);
        m
    }

    #[test]
    fn token_opens_transport() {
        let mut m = ChannelMachine::new(DELAY);
        let effects = m.handle(ChannelEvent::TokenAvailable("t1".into()));
        assert_eq!(effects, vec![Effect::OpenTransport { token: "t1".into() }]);
        assert_eq!(m.state(), ChannelState::Connecting);
    }

    #[test]
    fn empty_token_is_ignored() {
        let mut m = ChannelMachine::new(DELAY);
        assert!(m.handle(ChannelEvent::TokenAvailable(String::new())).is_empty());
        assert_eq!(m.state(), ChannelState::Idle);
    }

    #[test]
    fn second_token_while_open_does_not_reconnect() {
        let mut m = open_machine();
        assert!(m.handle(ChannelEvent::TokenAvailable("t2".into())).is_empty());
        assert_eq!(m.state(), ChannelState::Open);
    }

    #[test]
    fn retryable_close_schedules_reconnect() {
        for code in [Some(GOING_AWAY), Some(CONNECTION_LIMIT_EXCEEDED), Some(1006), None] {
            let mut m = open_machine();
            let effects = m.handle(ChannelEvent::TransportClosed { code });
            assert_eq!(effects, vec![Effect::ScheduleReconnect(DELAY)], "code {code:?}");
            assert_eq!(m.state(), ChannelState::ClosedRetryable);

            let effects = m.handle(ChannelEvent::ReconnectTimerFired);
            assert_eq!(effects, vec![Effect::OpenTransport { token: "t1".into() }]);
            assert_eq!(m.state(), ChannelState::Connecting);
        }
    }

    #[test]
    fn reconnect_uses_latest_token() {
        let mut m = open_machine();
        let _ = m.handle(ChannelEvent::TransportClosed { code: None });
        let _ = m.handle(ChannelEvent::TokenAvailable("t2".into()));
        assert_eq!(m.state(), ChannelState::ClosedRetryable);
        let effects = m.handle(ChannelEvent::ReconnectTimerFired);
        assert_eq!(effects, vec![Effect::OpenTransport { token: "t2".into() }]);
    }

    #[test]
    fn failed_connect_is_retryable() {
        let mut m = ChannelMachine::new(DELAY);
        let _ = m.handle(ChannelEvent::TokenAvailable("t1".into()));
        let effects = m.handle(ChannelEvent::TransportClosed { code: None });
        assert_eq!(effects, vec![Effect::ScheduleReconnect(DELAY)]);
    }

    #[test]
    fn auth_rejection_is_terminal() {
        let mut m = open_machine();
        assert!(m.handle(ChannelEvent::TransportClosed { code: Some(AUTH_REJECTED) }).is_empty());
        assert_eq!(m.state(), ChannelState::ClosedTerminal);
        assert!(m.handle(ChannelEvent::ReconnectTimerFired).is_empty());
        assert_eq!(m.state(), ChannelState::ClosedTerminal);
    }

    fn opens(effects: &[Effect]) -> usize {
        effects.iter().filter(|e| matches!(e, Effect::OpenTransport { .. })).count()
    }

    #[test]
    fn one_reconnect_after_drop_none_after_rejection() {
        let mut m = open_machine();

        let mut after_drop = m.handle(ChannelEvent::TransportClosed { code: Some(GOING_AWAY) });
        after_drop.extend(m.handle(ChannelEvent::ReconnectTimerFired));
        after_drop.extend(m.handle(ChannelEvent::TransportOpened));
        assert_eq!(opens(&after_drop), 1);
        assert_eq!(m.state(), ChannelState::Open);

        let mut after_rejection = m.handle(ChannelEvent::TransportClosed { code: Some(AUTH_REJECTED) });
        after_rejection.extend(m.handle(ChannelEvent::ReconnectTimerFired));
        after_rejection.extend(m.handle(ChannelEvent::ReconnectTimerFired));
        assert_eq!(opens(&after_rejection), 0);
        assert!(!after_rejection.iter().any(|e| matches!(e, Effect::ScheduleReconnect(_))));
        assert_eq!(m.state(), ChannelState::ClosedTerminal);
    }

    #[test]
    fn terminal_needs_a_fresh_token() {
        let mut m = open_machine();
        let _ = m.handle(ChannelEvent::TransportClosed { code: Some(AUTH_REJECTED) });

        assert!(m.handle(ChannelEvent::TokenAvailable("t1".into())).is_empty());
        assert_eq!(m.state(), ChannelState::ClosedTerminal);

        let effects = m.handle(ChannelEvent::TokenAvailable("t2".into()));
        assert_eq!(effects, vec![Effect::OpenTransport { token: "t2".into() }]);
        assert_eq!(m.state(), ChannelState::Connecting);
    }

    #[test]
    fn timer_fire_clears_pending_flag() {
        let mut m = open_machine();
        let _ = m.handle(ChannelEvent::TransportClosed { code: None });
        assert!(m.reconnect_pending());
        let _ = m.handle(ChannelEvent::ReconnectTimerFired);
        assert!(!m.reconnect_pending());
        assert!(m.handle(ChannelEvent::TransportOpened).is_empty());
        assert_eq!(m.state(), ChannelState::Open);
    }

    #[test]
    fn teardown_cancels_timer_and_closes() {
        let mut m = open_machine();
        assert_eq!(m.handle(ChannelEvent::Teardown), vec![Effect::CloseTransport]);
        assert_eq!(m.state(), ChannelState::Idle);

        let mut m = open_machine();
        let _ = m.handle(ChannelEvent::TransportClosed { code: Some(GOING_AWAY) });
        assert_eq!(m.handle(ChannelEvent::Teardown), vec![Effect::CancelReconnect]);
        assert_eq!(m.state(), ChannelState::Idle);

        let mut m = ChannelMachine::new(DELAY);
        assert!(m.handle(ChannelEvent::Teardown).is_empty());
    }

    #[test]
    fn logout_while_retrying_goes_idle() {
        let mut m = open_machine();
        let _ = m.handle(ChannelEvent::TransportClosed { code: None });
        assert_eq!(m.handle(ChannelEvent::TokenCleared), vec![Effect::CancelReconnect]);
        assert_eq!(m.state(), ChannelState::Idle);
        assert!(m.handle(ChannelEvent::ReconnectTimerFired).is_empty());
        assert_eq!(m.state(), ChannelState::Idle);
    }

    #[test]
    fn close_without_token_goes_idle() {
        let mut m = open_machine();
        let _ = m.handle(ChannelEvent::TokenCleared);
        // The transport close arrives after logout.
        assert!(m.handle(ChannelEvent::TransportClosed { code: Some(1000) }).is_empty());
        assert_eq!(m.state(), ChannelState::Idle);
    }

    #[test]
    fn stale_open_is_ignored() {
        let mut m = ChannelMachine::new(DELAY);
        assert!(m.handle(ChannelEvent::TransportOpened).is_empty());
        assert_eq!(m.state(), ChannelState::Idle);
    }
}
