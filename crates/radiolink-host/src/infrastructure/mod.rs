//! Infrastructure layer for the RadioLink host.
//!
//! Contains the adapters that touch the outside world: the platform radio
//! seam (plus a simulated radio), the discovery session and connection
//! manager that drive it, TOML configuration, and logging setup.

pub mod logging;
pub mod network;
pub mod radio;
pub mod storage;
