//! Domain entities for RadioLink.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the code base is the **domain**.  Domain code holds
//! the core rules of the system and never imports radio stacks, sockets,
//! threads, or UI frameworks.  Outer layers (infrastructure, application, the
//! binary) depend on the domain, but the domain never depends on them, which
//! keeps it trivially unit-testable.

/// Peer addresses and identities.
pub mod peer;

/// Ordered, duplicate-free discovery results.
pub mod peer_set;

/// Link-layer service identifiers.
pub mod service;

/// Connection states and the legal transition table.
///
/// See [`state::StateMachine`] for the main type.
pub mod state;
