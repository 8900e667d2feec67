//! Ordered, duplicate-free set of peers found during one scan.
//!
//! Radios report the same device many times while a scan is running (every
//! advertisement or inquiry response is a separate "found" event).  The user
//! should see each device once, in the order it first appeared, so that list
//! indices stay stable while the scan keeps adding entries.
//!
//! # Vec + HashSet choice
//!
//! The `Vec` keeps first-seen order and gives O(1) indexed selection; the
//! `HashSet` of addresses makes the membership test O(1) instead of a linear
//! scan over the list.

use std::collections::HashSet;

use crate::domain::peer::{PeerAddress, PeerIdentity};

/// Ordered collection of discovered peers with no duplicates.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredPeerSet {
    peers: Vec<PeerIdentity>,
    seen: HashSet<PeerAddress>,
}

impl DiscoveredPeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `peer` unless a peer with the same address is already present.
    ///
    /// Returns the index of the newly inserted peer, or `None` when the peer
    /// was already in the set (the earlier sighting is kept unchanged).
    pub fn insert(&mut self, peer: PeerIdentity) -> Option<usize> {
        if !self.seen.insert(peer.address().clone()) {
            return None;
        }
        self.peers.push(peer);
        Some(self.peers.len() - 1)
    }

    /// Returns the peer at `index` in first-seen order.
    pub fn get(&self, index: usize) -> Option<&PeerIdentity> {
        self.peers.get(index)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerIdentity> {
        self.peers.iter()
    }

    /// Removes every peer.  Called when a new scan starts.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.seen.clear();
    }

    /// Returns an owned copy of the peers in first-seen order.
    pub fn to_vec(&self) -> Vec<PeerIdentity> {
        self.peers.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(address: &str, name: Option<&str>) -> PeerIdentity {
        PeerIdentity::new(
            PeerAddress::new(address).expect("valid address"),
            name.map(str::to_string),
        )
    }

    #[test]
    fn test_new_set_is_empty() {
        let set = DiscoveredPeerSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_insert_returns_index_of_new_peer() {
        // Arrange
        let mut set = DiscoveredPeerSet::new();

        // Act
        let first = set.insert(peer("AA:01", None));
        let second = set.insert(peer("AA:02", None));

        // Assert
        assert_eq!(first, Some(0));
        assert_eq!(second, Some(1));
    }

    #[test]
    fn test_duplicates_keep_first_seen_order_and_first_name() {
        // Arrange
        let mut set = DiscoveredPeerSet::new();
        let sightings = [
            peer("AA:01", Some("first")),
            peer("AA:02", None),
            peer("aa:01", Some("renamed")),
            peer("AA:03", None),
            peer("AA:02", Some("late name")),
            peer("AA:01", None),
        ];

        // Act
        let inserted: Vec<Option<usize>> = sightings.into_iter().map(|p| set.insert(p)).collect();

        // Assert
        assert_eq!(inserted, vec![Some(0), Some(1), None, Some(2), None, None]);
        let addresses: Vec<&str> = set.iter().map(|p| p.address().as_str()).collect();
        assert_eq!(addresses, vec!["AA:01", "AA:02", "AA:03"]);
        assert_eq!(set.get(0).and_then(|p| p.name()), Some("first"));
        assert_eq!(set.get(1).and_then(|p| p.name()), None);
    }

    #[test]
    fn test_clear_allows_previously_seen_peers_again() {
        // Arrange
        let mut set = DiscoveredPeerSet::new();
        set.insert(peer("AA:01", None));

        // Act
        set.clear();
        let reinserted = set.insert(peer("AA:01", None));

        // Assert
        assert_eq!(reinserted, Some(0));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_get_out_of_range_returns_none() {
        let set = DiscoveredPeerSet::new();
        assert!(set.get(0).is_none());
    }
}
