//! # radiolink-core
//!
//! Shared library for RadioLink containing the peer identity types, the
//! discovery result set, and the connection state machine.
//!
//! This crate has zero dependencies on OS APIs, radio stacks, or threads.
//! Everything here can be compiled and tested on any platform.
//!
//! # Architecture overview (for beginners)
//!
//! RadioLink scans for nearby radio peripherals, lets a user pick one, and
//! keeps a single point-to-point link to it.  The moving parts that touch the
//! radio (scanning, sockets, worker threads) live in `radiolink-host`.  This
//! crate holds the rules those parts obey:
//!
//! - **`domain::peer`** – What a discovered device *is*: an address plus an
//!   optional display name, compared by address only.
//!
//! - **`domain::peer_set`** – The ordered, duplicate-free list of peers found
//!   during one scan.
//!
//! - **`domain::state`** – The seven connection states and the table of legal
//!   transitions between them.
//!
//! - **`domain::service`** – Well-known link-layer service identifiers.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `radiolink_core::PeerIdentity` instead of `radiolink_core::domain::peer::PeerIdentity`.
pub use domain::peer::{PeerAddress, PeerAddressError, PeerIdentity, UNKNOWN_DEVICE_LABEL};
pub use domain::peer_set::DiscoveredPeerSet;
pub use domain::service::{ServiceId, HID_SERVICE, SERIAL_PORT_SERVICE};
pub use domain::state::{ConnectionState, StateMachine, TransitionError};
