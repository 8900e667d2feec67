//! Discovery and link management on top of the platform radio.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Runs one scan at a time through a [`RadioAdapter`],
//!   collapses repeated sightings into an ordered, duplicate-free peer list,
//!   and reports `PeerFound` / `ScanFinished` events on an async channel.
//!
//! - **`connection_manager`** – Owns a single link session.  A dedicated worker
//!   thread runs the blocking connect and close calls while the manager moves
//!   the session through the connection state machine and reports every
//!   transition to a registered observer.
//!
//! [`RadioAdapter`]: crate::infrastructure::radio::RadioAdapter

pub mod connection_manager;
pub mod discovery;
