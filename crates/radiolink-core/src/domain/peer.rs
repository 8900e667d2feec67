//! Peer addresses and identities.
//!
//! A *peer* is a remote radio device that showed up during a scan.  The radio
//! stack identifies it by a stable, platform-level address (on Bluetooth this
//! is the 48-bit device address, e.g. `"00:1A:7D:DA:71:13"`).  A peer may also
//! advertise a human-readable name, but names are optional, not unique, and
//! can change between sightings, so they never take part in equality.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label shown for peers that did not advertise a name.
pub const UNKNOWN_DEVICE_LABEL: &str = "Unknown device";

/// Error returned when a string cannot be used as a [`PeerAddress`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerAddressError {
    #[error("peer address is empty")]
    Empty,
    #[error("peer address {0:?} contains whitespace or control characters")]
    InvalidCharacter(String),
}

/// Opaque platform-level address of a peer.
///
/// The address is treated as an opaque token.  It is trimmed and upper-cased
/// on construction so that `"aa:bb"` and `"AA:BB"` name the same device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Parses and normalises an address.
    ///
    /// # Errors
    ///
    /// Returns [`PeerAddressError::Empty`] for blank input and
    /// [`PeerAddressError::InvalidCharacter`] when the trimmed input still
    /// contains whitespace or control characters.
    pub fn new(raw: &str) -> Result<Self, PeerAddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PeerAddressError::Empty);
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(PeerAddressError::InvalidCharacter(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Returns the normalised address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerAddress {
    type Err = PeerAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = PeerAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<PeerAddress> for String {
    fn from(address: PeerAddress) -> Self {
        address.0
    }
}

/// A discovered peer: address plus optional advertised name.
///
/// Immutable once constructed.  Two identities are equal when their addresses
/// are equal, regardless of the name each sighting carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "PeerRecord")]
pub struct PeerIdentity {
    address: PeerAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl PeerIdentity {
    /// Creates an identity.  An empty name is stored as `None`.
    pub fn new(address: PeerAddress, name: Option<String>) -> Self {
        let name = name.filter(|n| !n.trim().is_empty());
        Self { address, name }
    }

    /// Convenience constructor for an identity without a name.
    pub fn unnamed(address: PeerAddress) -> Self {
        Self::new(address, None)
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name to show in a device list: the advertised name, or
    /// [`UNKNOWN_DEVICE_LABEL`] when the peer did not advertise one.
    pub fn display_label(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_DEVICE_LABEL)
    }
}

/// Wire form of [`PeerIdentity`]; deserialising goes through
/// [`PeerIdentity::new`] so blank names are dropped.
#[derive(Deserialize)]
struct PeerRecord {
    address: PeerAddress,
    #[serde(default)]
    name: Option<String>,
}

impl From<PeerRecord> for PeerIdentity {
    fn from(record: PeerRecord) -> Self {
        Self::new(record.address, record.name)
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeerIdentity {}

impl Hash for PeerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_label(), self.address)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
