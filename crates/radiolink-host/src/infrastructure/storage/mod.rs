//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML configuration file from the
//! platform-appropriate directory (or an explicit path given on the command
//! line) and falls back to defaults when no file exists yet.

pub mod config;
