//! Reconnection state machine
//!
//! Pure bookkeeping for the connection lifecycle. The WebSocket manager feeds
//! it transport events and acts on the transitions it returns; nothing here
//! touches the network or the clock.

use crate::error::{ClientError, Result};
use std::fmt;
use std::time::Duration;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting(u32),
    /// Terminal: automatic retries are exhausted
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting(n) => write!(f, "reconnecting (attempt {})", n),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Linear backoff: attempt `n` waits `n * base_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// What the caller should do after an unexpected close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Retry { attempt: u32, delay: Duration },
    Exhausted,
    /// The close arrived in a state where it means nothing
    Ignored,
}

pub struct ReconnectController {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempt: u32,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        ReconnectController {
            policy,
            state: ConnectionState::Disconnected,
            attempt: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// First connection of a fresh controller
    pub fn begin_connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(ClientError::StateError(format!(
                "Cannot connect while {}",
                self.state
            )));
        }
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Transport open succeeded
    pub fn on_open(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Connected;
        self.attempt = 0;
        true
    }

    /// Transport closed (or failed to open) without a teardown request
    pub fn on_unexpected_close(&mut self) -> Transition {
        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                let next = self.attempt + 1;
                if next > self.policy.max_attempts {
                    self.state = ConnectionState::Failed;
                    return Transition::Exhausted;
                }
                self.attempt = next;
                self.state = ConnectionState::Reconnecting(next);
                Transition::Retry {
                    attempt: next,
                    delay: self.policy.delay_for(next),
                }
            }
            _ => Transition::Ignored,
        }
    }

    /// The backoff timer fired
    pub fn on_retry_due(&mut self) -> bool {
        match self.state {
            ConnectionState::Reconnecting(_) => {
                self.state = ConnectionState::Connecting;
                true
            }
            _ => false,
        }
    }

    /// Caller asked to close. `Failed` stays `Failed`.
    pub fn on_teardown(&mut self) {
        if self.state != ConnectionState::Failed {
            self.state = ConnectionState::Disconnected;
        }
    }
}
