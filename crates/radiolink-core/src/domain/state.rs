//! Connection states and the legal transition table.
//!
//! # Connection lifecycle (for beginners)
//!
//! A link to a peer moves through these states:
//!
//! ```text
//!            connect()                 connect ok              disconnect()
//!   None ─────────────► ConnectStarting ───────────► Connected ────────────► DisconnectStarting
//!                              │                         │                           │
//!                  connect err │               link lost │                           │ link closed
//!                              ▼                         ▼                           │
//!                        ConnectFailed             ConnectionLost                    │
//!                              │                         │                           │
//!                              └──────────────► Disconnected ◄───────────────────────┘
//! ```
//!
//! - `None`: nothing has happened yet.
//! - `ConnectStarting`: a worker is running the blocking connect call.
//! - `ConnectFailed`: the connect call failed; the link is being closed.
//! - `Connected`: the link is open.
//! - `ConnectionLost`: the peer dropped the link; it is being closed.
//! - `DisconnectStarting`: the user asked to disconnect; the link is closing.
//! - `Disconnected`: the link is closed and the session is over.
//!
//! [`StateMachine`] is the only way to move between states.  It refuses any
//! transition that is not an edge of the diagram above.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current state of a single link session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection attempt has been made.
    None,
    /// The blocking connect call is in progress.
    ConnectStarting,
    /// The connect call failed.
    ConnectFailed,
    /// The link is open.
    Connected,
    /// The peer dropped an established link.
    ConnectionLost,
    /// A user-requested disconnect is in progress.
    DisconnectStarting,
    /// The link is closed; the session is over.
    Disconnected,
}

impl ConnectionState {
    /// All states, in lifecycle order.
    pub const ALL: [ConnectionState; 7] = [
        ConnectionState::None,
        ConnectionState::ConnectStarting,
        ConnectionState::ConnectFailed,
        ConnectionState::Connected,
        ConnectionState::ConnectionLost,
        ConnectionState::DisconnectStarting,
        ConnectionState::Disconnected,
    ];

    /// Returns `true` when `self -> next` is an edge of the transition table.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (None, ConnectStarting)
                | (ConnectStarting, Connected)
                | (ConnectStarting, ConnectFailed)
                | (ConnectFailed, Disconnected)
                | (Connected, DisconnectStarting)
                | (Connected, ConnectionLost)
                | (DisconnectStarting, Disconnected)
                | (ConnectionLost, Disconnected)
        )
    }

    /// `Disconnected` has no outgoing edges.
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Disconnected
    }

    /// States from which the worker must close the link and finish.
    pub fn is_closing(self) -> bool {
        matches!(
            self,
            ConnectionState::ConnectFailed
                | ConnectionState::ConnectionLost
                | ConnectionState::DisconnectStarting
        )
    }

    /// Short lower-case name used in log lines and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::None => "none",
            ConnectionState::ConnectStarting => "connect-starting",
            ConnectionState::ConnectFailed => "connect-failed",
            ConnectionState::Connected => "connected",
            ConnectionState::ConnectionLost => "connection-lost",
            ConnectionState::DisconnectStarting => "disconnect-starting",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a transition is not in the table.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal connection state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Holder of the current state that only moves along legal edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    current: ConnectionState,
}

impl StateMachine {
    /// Creates a machine in [`ConnectionState::None`].
    pub fn new() -> Self {
        Self {
            current: ConnectionState::None,
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// Moves to `next`, returning the previous state.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] and leaves the state unchanged when
    /// `current -> next` is not a legal edge.
    pub fn transition(&mut self, next: ConnectionState) -> Result<ConnectionState, TransitionError> {
        if !self.current.can_transition_to(next) {
            return Err(TransitionError {
                from: self.current,
                to: next,
            });
        }
        let previous = self.current;
        self.current = next;
        Ok(previous)
    }

    /// Puts a finished machine back to [`ConnectionState::None`].
    ///
    /// Only a terminal machine can be reset; returns `false` and leaves the
    /// state untouched otherwise.
    pub fn reset(&mut self) -> bool {
        if !self.current.is_terminal() {
            return false;
        }
        self.current = ConnectionState::None;
        true
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
