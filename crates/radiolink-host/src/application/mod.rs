//! Application layer use cases for the RadioLink host.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The *application* layer sits between the domain types in `radiolink-core`
//! and the infrastructure that talks to the radio.  A use case here holds the
//! caller-side state of a user goal and decides which infrastructure call to
//! make next, but never blocks on radio I/O itself.
//!
//! # Sub-modules
//!
//! - **`manage_link`** – Tracks the peer the user picked from the scan
//!   results, creates a fresh connection manager for each connect, and
//!   decides when the connect / disconnect actions are available.

pub mod manage_link;
