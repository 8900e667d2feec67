//! LinkController: the caller side of "pick a peer, connect, disconnect".
//!
//! The controller holds what a host screen holds: the peer the user picked
//! from the scan results and the connection manager of the current attempt.
//! It creates a fresh [`ConnectionManager`] for every connect and releases it
//! when the caller feeds back `Disconnected`, so each attempt starts from a
//! clean state machine.
//!
//! # Feeding states back
//!
//! State changes arrive on the observer passed to [`LinkController::new`],
//! usually on a worker thread.  The caller forwards them (for example through
//! a channel) to [`LinkController::on_state_changed`] on its own thread.
//! Calling `on_state_changed` from inside the observer would drop a manager
//! while its lock is held, so that is not allowed.
//!
//! # Action availability
//!
//! | Action     | Available when                                   |
//! |------------|--------------------------------------------------|
//! | connect    | a peer is selected and no manager is active      |
//! | disconnect | the active manager last reported `Connected`     |

use std::sync::Arc;

use radiolink_core::{ConnectionState, PeerIdentity, ServiceId};
use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::network::connection_manager::{
    ConnectionError, ConnectionManager, StateObserver,
};
use crate::infrastructure::radio::{AdapterStatus, LinkProvider, RadioAdapter};

/// Error type for link controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The radio adapter is absent or switched off.
    #[error("radio adapter unavailable ({status})")]
    AdapterUnavailable { status: AdapterStatus },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Caller-side state for connecting to one selected peer at a time.
pub struct LinkController {
    links: Arc<dyn LinkProvider>,
    service: ServiceId,
    observer: Arc<dyn StateObserver>,
    selected: Option<PeerIdentity>,
    active: Option<ConnectionManager>,
    last_state: ConnectionState,
}

impl LinkController {
    /// Creates a controller with no peer selected.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::AdapterUnavailable`] when `adapter` is
    /// absent or disabled.
    pub fn new(
        adapter: &dyn RadioAdapter,
        links: Arc<dyn LinkProvider>,
        service: ServiceId,
        observer: Arc<dyn StateObserver>,
    ) -> Result<Self, ControllerError> {
        let status = adapter.status();
        if !status.is_enabled() {
            return Err(ControllerError::AdapterUnavailable { status });
        }
        Ok(Self {
            links,
            service,
            observer,
            selected: None,
            active: None,
            last_state: ConnectionState::None,
        })
    }

    pub fn select_peer(&mut self, peer: PeerIdentity) {
        info!(%peer, "peer selected");
        self.selected = Some(peer);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected_peer(&self) -> Option<&PeerIdentity> {
        self.selected.as_ref()
    }

    /// Connects to the selected peer through a new connection manager.
    ///
    /// Returns `Ok(false)` without doing anything when no peer is selected or
    /// a manager is still active.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Connection`] when the link worker cannot be
    /// started.
    pub fn connect(&mut self) -> Result<bool, ControllerError> {
        let Some(peer) = self.selected.clone() else {
            debug!("connect ignored: no peer selected");
            return Ok(false);
        };
        if self.active.is_some() {
            debug!(%peer, "connect ignored: a link is already active");
            return Ok(false);
        }

        let services = self.links.advertised_services(&peer);
        info!(%peer, ?services, "peer advertises services");

        let manager = ConnectionManager::new(
            Arc::clone(&self.links),
            self.service,
            Arc::clone(&self.observer),
        );
        let started = manager.connect(peer)?;
        if started {
            self.active = Some(manager);
        }
        Ok(started)
    }

    /// Asks the active manager to disconnect.  No-op without one.
    pub fn disconnect(&self) {
        match &self.active {
            Some(manager) => manager.disconnect(),
            None => debug!("disconnect ignored: no active link"),
        }
    }

    /// Forwards a link-lost notification to the active manager.
    pub fn report_link_lost(&self) {
        if let Some(manager) = &self.active {
            manager.report_link_lost();
        }
    }

    /// Records a state reported by the observer.  `Disconnected` releases
    /// the active manager.
    ///
    /// A `Disconnected` left over from an earlier attempt (for example one
    /// whose worker never started) is ignored while the active manager is
    /// still live.
    pub fn on_state_changed(&mut self, state: ConnectionState) {
        if state == ConnectionState::Disconnected {
            if let Some(manager) = &self.active {
                if manager.state() != ConnectionState::Disconnected {
                    debug!(active = %manager.state(), "stale disconnected state ignored");
                    return;
                }
            }
        }
        self.last_state = state;
        if state == ConnectionState::Disconnected && self.active.take().is_some() {
            debug!("connection manager released");
        }
    }

    /// The last state fed to [`on_state_changed`](Self::on_state_changed).
    pub fn state(&self) -> ConnectionState {
        self.last_state
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn can_connect(&self) -> bool {
        self.selected.is_some() && self.active.is_none()
    }

    pub fn can_disconnect(&self) -> bool {
        self.active.is_some() && self.last_state == ConnectionState::Connected
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
