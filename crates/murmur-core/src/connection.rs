//! Connection lifecycle state machine.
//!
//! The manager decides; it never performs I/O. Every transition returns an
//! [`Action`] that the runtime carries out (open a socket, close it, arm a
//! reconnect timer). Each transport attempt is tagged with a generation so
//! late events from an abandoned socket cannot disturb the current one.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Local precondition failures of [`ConnectionManager::connect`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// No usable token in the session.
    #[error("No auth token available")]
    NoToken,
}

/// Automatic reconnection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay before each reconnection attempt.
    pub delay: Duration,
    /// Attempts allowed after an unexpected close before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
            max_attempts: 5,
        }
    }
}

/// Transport generation number.
pub type Generation = u64;

/// Work the runtime must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do.
    None,
    /// Open a new transport tagged with `generation`.
    OpenTransport { generation: Generation },
    /// Close the live transport.
    CloseTransport { generation: Generation },
    /// Arm a timer; when it fires call [`ConnectionManager::on_reconnect_timer`].
    ScheduleReconnect {
        generation: Generation,
        delay: Duration,
        attempt: u32,
    },
    /// Retries are exhausted; surface a terminal failure.
    GiveUp { attempts: u32 },
}

/// Owns the connection state for one session.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    policy: ReconnectPolicy,
    /// Reconnect attempts since the last successful open.
    attempts: u32,
    /// Whether the user wants to be connected.
    wanted: bool,
    generation: Generation,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
            attempts: 0,
            wanted: false,
            generation: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Generation of the most recent transport.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// User-initiated connect.
    ///
    /// Idempotent while connecting or connected. Re-arms automatic
    /// reconnection and resets the attempt counter.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::NoToken`] if `has_token` is false.
    pub fn connect(&mut self, has_token: bool) -> Result<Action, ConnectError> {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = %self.state, "Connect ignored, already active");
            self.wanted = true;
            return Ok(Action::None);
        }
        if !has_token {
            warn!("Cannot connect without a token");
            return Err(ConnectError::NoToken);
        }

        self.wanted = true;
        self.attempts = 0;
        Ok(self.open())
    }

    /// User-initiated disconnect. Never schedules a retry.
    pub fn disconnect(&mut self) -> Action {
        self.wanted = false;
        self.attempts = 0;

        let action = match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                info!(generation = self.generation, "Disconnecting");
                Action::CloseTransport {
                    generation: self.generation,
                }
            }
            ConnectionState::Disconnected => Action::None,
        };
        self.state = ConnectionState::Disconnected;
        action
    }

    /// The transport finished its handshake.
    pub fn on_open(&mut self, generation: Generation) -> Action {
        if !self.is_current(generation) {
            return Action::None;
        }
        if !self.wanted || self.state != ConnectionState::Connecting {
            // Disconnected while the handshake was in flight.
            return Action::CloseTransport { generation };
        }

        info!(generation, "Connected");
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        Action::None
    }

    /// The transport reported an error. Reconnection waits for the close.
    pub fn on_error(&mut self, generation: Generation) -> bool {
        let current = self.is_current(generation);
        if current {
            warn!(generation, state = %self.state, "Transport error");
        }
        current
    }

    /// The transport closed.
    pub fn on_close(&mut self, generation: Generation) -> Action {
        if !self.is_current(generation) {
            return Action::None;
        }
        if !self.wanted {
            self.state = ConnectionState::Disconnected;
            return Action::None;
        }

        self.state = ConnectionState::Disconnected;
        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            info!(
                attempt = self.attempts,
                max = self.policy.max_attempts,
                delay_ms = self.policy.delay.as_millis() as u64,
                "Connection lost, scheduling reconnect"
            );
            Action::ScheduleReconnect {
                generation: self.generation,
                delay: self.policy.delay,
                attempt: self.attempts,
            }
        } else {
            warn!(attempts = self.attempts, "Reconnect attempts exhausted");
            self.wanted = false;
            Action::GiveUp {
                attempts: self.attempts,
            }
        }
    }

    /// A reconnect timer fired.
    ///
    /// Stale timers (after a disconnect or a newer connect) are no-ops.
    pub fn on_reconnect_timer(&mut self, generation: Generation, has_token: bool) -> Action {
        if !self.wanted
            || generation != self.generation
            || self.state != ConnectionState::Disconnected
        {
            debug!(generation, "Stale reconnect timer ignored");
            return Action::None;
        }
        if !has_token {
            warn!("Token disappeared, abandoning reconnect");
            self.wanted = false;
            return Action::None;
        }
        self.open()
    }

    /// The server refused our credentials. Stop everything.
    pub fn on_auth_rejected(&mut self, generation: Generation) -> Action {
        if !self.is_current(generation) {
            return Action::None;
        }
        self.wanted = false;
        self.attempts = 0;
        self.state = ConnectionState::Disconnected;
        Action::None
    }

    fn open(&mut self) -> Action {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        debug!(generation = self.generation, "Opening transport");
        Action::OpenTransport {
            generation: self.generation,
        }
    }

    fn is_current(&self, generation: Generation) -> bool {
        if generation != self.generation {
            debug!(generation, current = self.generation, "Event from stale transport");
            return false;
        }
        true
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened(manager: &mut ConnectionManager) -> Generation {
        match manager.connect(true).unwrap() {
            Action::OpenTransport { generation } => {
                manager.on_open(generation);
                generation
            }
            other => panic!("Expected OpenTransport, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_requires_token() {
        let mut manager = ConnectionManager::default();
        assert_eq!(manager.connect(false), Err(ConnectError::NoToken));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut manager = ConnectionManager::default();
        assert_eq!(
            manager.connect(true),
            Ok(Action::OpenTransport { generation: 1 })
        );
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.connect(true), Ok(Action::None));

        manager.on_open(1);
        assert!(manager.is_connected());
        assert_eq!(manager.connect(true), Ok(Action::None));
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_unexpected_close_schedules_reconnect() {
        let mut manager = ConnectionManager::default();
        let generation = opened(&mut manager);

        let action = manager.on_close(generation);
        assert_eq!(
            action,
            Action::ScheduleReconnect {
                generation,
                delay: Duration::from_millis(3000),
                attempt: 1
            }
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        assert_eq!(
            manager.on_reconnect_timer(generation, true),
            Action::OpenTransport {
                generation: generation + 1
            }
        );
    }

    #[test]
    fn test_open_resets_attempts() {
        let mut manager = ConnectionManager::default();
        let generation = opened(&mut manager);
        manager.on_close(generation);
        manager.on_reconnect_timer(generation, true);
        assert_eq!(manager.attempts(), 1);

        manager.on_open(generation + 1);
        assert_eq!(manager.attempts(), 0);
    }

    #[test]
    fn test_retries_stop_after_max() {
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(10),
            max_attempts: 3,
        };
        let mut manager = ConnectionManager::new(policy);
        let mut generation = opened(&mut manager);

        for attempt in 1..=3 {
            match manager.on_close(generation) {
                Action::ScheduleReconnect { attempt: a, .. } => assert_eq!(a, attempt),
                other => panic!("Expected ScheduleReconnect, got {:?}", other),
            }
            match manager.on_reconnect_timer(generation, true) {
                Action::OpenTransport { generation: g } => generation = g,
                other => panic!("Expected OpenTransport, got {:?}", other),
            }
            // Handshake fails: error then close.
            assert!(manager.on_error(generation));
        }

        assert_eq!(manager.on_close(generation), Action::GiveUp { attempts: 3 });
        // Nothing resumes on its own.
        assert_eq!(manager.on_reconnect_timer(generation, true), Action::None);
        assert_eq!(manager.on_close(generation), Action::None);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // Explicit connect starts over.
        assert!(matches!(
            manager.connect(true),
            Ok(Action::OpenTransport { .. })
        ));
        assert_eq!(manager.attempts(), 0);
    }

    #[test]
    fn test_disconnect_never_retries() {
        let mut manager = ConnectionManager::default();
        let generation = opened(&mut manager);

        assert_eq!(
            manager.disconnect(),
            Action::CloseTransport { generation }
        );
        // Disconnected as soon as the close is requested.
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.on_close(generation), Action::None);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.disconnect(), Action::None);
    }

    #[test]
    fn test_pending_timer_after_disconnect_is_noop() {
        let mut manager = ConnectionManager::default();
        let generation = opened(&mut manager);
        manager.on_close(generation);

        manager.disconnect();
        assert_eq!(manager.on_reconnect_timer(generation, true), Action::None);
        assert_eq!(manager.attempts(), 0);
    }

    #[test]
    fn test_stale_generation_events_ignored() {
        let mut manager = ConnectionManager::default();
        let first = opened(&mut manager);
        manager.disconnect();
        let second = opened(&mut manager);
        assert_ne!(first, second);

        assert_eq!(manager.on_close(first), Action::None);
        assert!(!manager.on_error(first));
        assert!(manager.is_connected());
    }

    #[test]
    fn test_open_after_disconnect_closes_socket() {
        let mut manager = ConnectionManager::default();
        let generation = match manager.connect(true).unwrap() {
            Action::OpenTransport { generation } => generation,
            other => panic!("Expected OpenTransport, got {:?}", other),
        };
        manager.disconnect();
        assert_eq!(
            manager.on_open(generation),
            Action::CloseTransport { generation }
        );
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_missing_token_on_retry_stops() {
        let mut manager = ConnectionManager::default();
        let generation = opened(&mut manager);
        manager.on_close(generation);
        assert_eq!(manager.on_reconnect_timer(generation, false), Action::None);
        assert_eq!(manager.on_reconnect_timer(generation, true), Action::None);
    }

    #[test]
    fn test_auth_rejection_stops_retrying() {
        let mut manager = ConnectionManager::default();
        let generation = match manager.connect(true).unwrap() {
            Action::OpenTransport { generation } => generation,
            other => panic!("Expected OpenTransport, got {:?}", other),
        };
        manager.on_auth_rejected(generation);
        assert_eq!(manager.on_close(generation), Action::None);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
