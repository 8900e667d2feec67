//! Platform radio seam.
//!
//! RadioLink never talks to a Bluetooth stack directly.  Everything it needs
//! from the platform goes through three traits:
//!
//! - [`RadioAdapter`] – the local radio: is it present and switched on, and
//!   start or cancel an asynchronous scan.
//! - [`LinkProvider`] – creates unconnected [`RadioLink`] handles for a peer
//!   and service, and reports the services a peer advertises.
//! - [`RadioLink`] – a single point-to-point link with a *blocking* connect
//!   and a close.
//!
//! # Threading contract
//!
//! ```text
//!  caller thread                 radio thread(s)               link worker
//!  ─────────────                 ───────────────               ───────────
//!  start_discovery(listener) ──► peer_found(peer) ...
//!                                scan_finished()
//!  create_link(peer, svc) ─────────────────────────────────► link.connect()  (blocks)
//!                                                            link.close()
//! ```
//!
//! Scan callbacks may arrive on any thread, so [`DiscoveryListener`] must be
//! `Send + Sync`.  `create_link` must return quickly; the blocking calls on
//! [`RadioLink`] are only ever made from the connection manager's worker
//! thread.
//!
//! # Testability
//!
//! [`simulated::SimulatedRadio`] implements both [`RadioAdapter`] and
//! [`LinkProvider`] from a list of configured peers and counts every call, so
//! tests and the command-line host can run without radio hardware.

use std::fmt;
use std::sync::Arc;

use radiolink_core::{PeerAddress, PeerIdentity, ServiceId};
use thiserror::Error;

pub mod simulated;

/// Availability of the local radio adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    /// The machine has no radio adapter.
    Absent,
    /// The adapter exists but is switched off.
    Disabled,
    /// The adapter is ready to scan and connect.
    Enabled,
}

impl AdapterStatus {
    pub fn is_enabled(self) -> bool {
        self == AdapterStatus::Enabled
    }
}

impl fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AdapterStatus::Absent => "absent",
            AdapterStatus::Disabled => "disabled",
            AdapterStatus::Enabled => "enabled",
        };
        f.write_str(text)
    }
}

/// Error type for adapter-level operations.
#[derive(Debug, Error)]
pub enum RadioError {
    /// The adapter is absent or switched off.
    #[error("radio adapter is {0}")]
    Unavailable(AdapterStatus),
    /// The background scan thread could not be started.
    #[error("failed to spawn scan thread: {0}")]
    ScanThread(#[source] std::io::Error),
}

/// Error type for a single link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The adapter refused to create a link handle.
    #[error("cannot create link to {peer}: radio adapter is {status}")]
    AdapterUnavailable {
        peer: PeerAddress,
        status: AdapterStatus,
    },
    /// The blocking connect call failed.
    #[error("connect to {peer} failed: {reason}")]
    ConnectFailed { peer: PeerAddress, reason: String },
    /// Closing the link failed.
    #[error("closing link to {peer} failed: {reason}")]
    CloseFailed { peer: PeerAddress, reason: String },
}

/// Receiver of scan results.
///
/// Implementations are called from the radio's own threads.
pub trait DiscoveryListener: Send + Sync {
    /// A peer was seen.  The same peer may be reported many times per scan.
    fn peer_found(&self, peer: PeerIdentity);
    /// The scan ended, either because its window elapsed or because it was
    /// cancelled.
    fn scan_finished(&self);
}

/// The local radio adapter.
pub trait RadioAdapter: Send + Sync {
    /// Returns whether the adapter is present and switched on.
    fn status(&self) -> AdapterStatus;

    /// Starts an asynchronous scan that reports to `listener`.
    ///
    /// Starting a scan while one is running restarts it; the superseded scan
    /// stops without calling `scan_finished`.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError`] when the adapter is not enabled or the scan
    /// cannot be started.
    fn start_discovery(&self, listener: Arc<dyn DiscoveryListener>) -> Result<(), RadioError>;

    /// Cancels the running scan, if any.  The listener then receives
    /// `scan_finished`.
    fn cancel_discovery(&self);
}

/// Factory for link handles.
pub trait LinkProvider: Send + Sync {
    /// Creates an unconnected link to `peer` for `service`.  Must not block.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::AdapterUnavailable`] when the adapter cannot
    /// create links.
    fn create_link(
        &self,
        peer: &PeerIdentity,
        service: ServiceId,
    ) -> Result<Box<dyn RadioLink>, LinkError>;

    /// Services the peer advertises, as last reported by the radio.
    fn advertised_services(&self, peer: &PeerIdentity) -> Vec<ServiceId>;
}

/// A single point-to-point link.
///
/// Owned by exactly one worker thread for its whole life.
pub trait RadioLink: Send {
    /// Address of the remote end.
    fn peer(&self) -> &PeerAddress;

    /// Opens the link.  Blocks until the peer accepts or the attempt fails.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectFailed`] when the link could not be opened.
    fn connect(&mut self) -> Result<(), LinkError>;

    /// Closes the link.  Safe to call on a link that never connected.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::CloseFailed`] when the platform reports an error.
    fn close(&mut self) -> Result<(), LinkError>;
}
