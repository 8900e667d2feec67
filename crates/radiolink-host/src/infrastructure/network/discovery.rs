//! Discovery session: one scan at a time, deduplicated results.
//!
//! A [`DiscoverySession`] drives a [`RadioAdapter`] scan and turns its raw
//! callbacks into a stable, ordered peer list plus two events:
//!
//! ```text
//!  start_scan()                                    stop_scan()
//!      │  clear list, scanning = true                  │  cancel_discovery()
//!      ▼                                               ▼
//!  radio: peer_found(A) peer_found(B) peer_found(A) ... scan_finished()
//!              │              │             │                │
//!              ▼              ▼             ▼ (duplicate,    ▼ scanning = false
//!      PeerFound{0, A}  PeerFound{1, B}       dropped)   ScanFinished{2}
//! ```
//!
//! # Why the list is cleared at scan start (for beginners)
//!
//! Indices in `PeerFound` events are positions in the current list.  Clearing
//! before the platform scan starts means index 0 always refers to the first
//! peer of *this* scan, and a peer seen in a previous scan is reported again
//! when it shows up in the new one.
//!
//! # Threading
//!
//! The radio calls back from its own threads.  Results and the scanning flag
//! live behind one mutex that the callbacks and the accessors share.  Each
//! scan gets its own listener tagged with a generation number, so late
//! callbacks from a restarted scan are dropped instead of touching the new
//! results.  Events
//! go out on an unbounded Tokio channel, which can be fed from any thread
//! without blocking the radio.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use radiolink_core::{DiscoveredPeerSet, PeerIdentity};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::infrastructure::radio::{AdapterStatus, DiscoveryListener, RadioAdapter, RadioError};

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The radio adapter is absent or switched off.
    #[error("radio adapter unavailable ({status})")]
    AdapterUnavailable { status: AdapterStatus },
    /// The platform refused to start the scan.
    #[error("failed to start scan: {0}")]
    ScanFailed(#[from] RadioError),
}

/// Events emitted by a discovery session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A peer not yet in the list was appended at `index`.
    PeerFound { index: usize, peer: PeerIdentity },
    /// The scan ended with `peer_count` distinct peers in the list.
    ScanFinished { peer_count: usize },
}

#[derive(Debug, Default)]
struct ScanState {
    peers: DiscoveredPeerSet,
    scanning: bool,
    /// Bumped by every `start_scan`; callbacks tagged with an older value
    /// belong to a superseded scan.
    generation: u64,
}

/// State shared between the session and the listeners it hands out.
struct SessionShared {
    state: Mutex<ScanState>,
    events: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DiscoveryEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.events.send(event);
    }
}

/// The half of the session the radio calls into, bound to one scan.
struct ScanListener {
    shared: Arc<SessionShared>,
    generation: u64,
}

impl ScanListener {
    /// Locks the shared state, or returns `None` when this scan has been
    /// superseded by a newer `start_scan`.
    fn current(&self) -> Option<MutexGuard<'_, ScanState>> {
        let state = self.shared.lock();
        if state.generation == self.generation {
            Some(state)
        } else {
            debug!(
                generation = self.generation,
                current = state.generation,
                "callback from superseded scan dropped"
            );
            None
        }
    }
}

impl DiscoveryListener for ScanListener {
    fn peer_found(&self, peer: PeerIdentity) {
        let Some(mut state) = self.current() else {
            return;
        };
        match state.peers.insert(peer.clone()) {
            Some(index) => {
                debug!(index, %peer, "peer found");
                self.shared.emit(DiscoveryEvent::PeerFound { index, peer });
            }
            None => debug!(address = %peer.address(), "duplicate sighting dropped"),
        }
    }

    fn scan_finished(&self) {
        let Some(mut state) = self.current() else {
            return;
        };
        state.scanning = false;
        let peer_count = state.peers.len();
        info!(peer_count, "scan finished");
        self.shared.emit(DiscoveryEvent::ScanFinished { peer_count });
    }
}

/// Scans for peers and keeps the deduplicated result list.
pub struct DiscoverySession {
    adapter: Arc<dyn RadioAdapter>,
    shared: Arc<SessionShared>,
}

impl DiscoverySession {
    /// Creates a session on `adapter` and returns it together with the event
    /// receiver.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::AdapterUnavailable`] when the adapter is
    /// absent or disabled.
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DiscoveryEvent>), DiscoveryError> {
        let status = adapter.status();
        if !status.is_enabled() {
            return Err(DiscoveryError::AdapterUnavailable { status });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            adapter,
            shared: Arc::new(SessionShared {
                state: Mutex::new(ScanState::default()),
                events: tx,
            }),
        };
        Ok((session, rx))
    }

    /// Clears the result list and starts a new scan.  Calling this while a
    /// scan is running restarts it.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::ScanFailed`] when the radio refuses to scan;
    /// the session is then left not scanning with an empty list.
    pub fn start_scan(&self) -> Result<(), DiscoveryError> {
        let generation = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.peers.clear();
            state.scanning = true;
            state.generation
        };

        // The radio may call back synchronously, so the lock is not held here.
        let listener: Arc<dyn DiscoveryListener> = Arc::new(ScanListener {
            shared: Arc::clone(&self.shared),
            generation,
        });
        if let Err(e) = self.adapter.start_discovery(listener) {
            let mut state = self.shared.lock();
            if state.generation == generation {
                state.scanning = false;
            }
            return Err(e.into());
        }
        info!("scan started");
        Ok(())
    }

    /// Asks the radio to cancel the running scan.  Results are kept; the
    /// scanning flag drops when the radio reports the scan finished.
    pub fn stop_scan(&self) {
        if !self.is_scanning() {
            debug!("stop_scan ignored: no scan running");
            return;
        }
        info!("cancelling scan");
        self.adapter.cancel_discovery();
    }

    pub fn is_scanning(&self) -> bool {
        self.shared.lock().scanning
    }

    /// Snapshot of the results in first-seen order.
    pub fn peers(&self) -> Vec<PeerIdentity> {
        self.shared.lock().peers.to_vec()
    }

    /// The peer at `index` in the current results.
    pub fn peer(&self, index: usize) -> Option<PeerIdentity> {
        self.shared.lock().peers.get(index).cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.shared.lock().peers.len()
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        if self.is_scanning() {
            self.adapter.cancel_discovery();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use radiolink_core::PeerAddress;

    /// Adapter that hands the listener back to the test instead of scanning.
    struct ManualAdapter {
        status: AdapterStatus,
        listener: Mutex<Option<Arc<dyn DiscoveryListener>>>,
        starts: Mutex<u32>,
        cancels: Mutex<u32>,
        fail_start: bool,
    }

    impl ManualAdapter {
        fn new(status: AdapterStatus) -> Arc<Self> {
            Arc::new(Self {
                status,
                listener: Mutex::new(None),
                starts: Mutex::new(0),
                cancels: Mutex::new(0),
                fail_start: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                status: AdapterStatus::Enabled,
                listener: Mutex::new(None),
                starts: Mutex::new(0),
                cancels: Mutex::new(0),
                fail_start: true,
            })
        }

        fn listener(&self) -> Arc<dyn DiscoveryListener> {
            self.listener
                .lock()
                .expect("lock poisoned")
                .clone()
                .expect("start_discovery was not called")
        }

        fn found(&self, address: &str) {
            let peer = PeerIdentity::unnamed(PeerAddress::new(address).expect("valid"));
            self.listener().peer_found(peer);
        }
    }

    impl RadioAdapter for ManualAdapter {
        fn status(&self) -> AdapterStatus {
            self.status
        }

        fn start_discovery(&self, listener: Arc<dyn DiscoveryListener>) -> Result<(), RadioError> {
            if self.fail_start {
                return Err(RadioError::Unavailable(AdapterStatus::Disabled));
            }
            *self.starts.lock().expect("lock poisoned") += 1;
            *self.listener.lock().expect("lock poisoned") = Some(listener);
            Ok(())
        }

        fn cancel_discovery(&self) {
            *self.cancels.lock().expect("lock poisoned") += 1;
            if let Some(listener) = self.listener.lock().expect("lock poisoned").clone() {
                listener.scan_finished();
            }
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DiscoveryEvent>) -> Vec<DiscoveryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_new_fails_when_adapter_is_absent_or_disabled() {
        for status in [AdapterStatus::Absent, AdapterStatus::Disabled] {
            let adapter = ManualAdapter::new(status);
            let result = DiscoverySession::new(adapter);
            assert!(matches!(
                result,
                Err(DiscoveryError::AdapterUnavailable { status: s }) if s == status
            ));
        }
    }

    #[test]
    fn test_duplicate_sightings_emit_one_event_per_peer() {
        // Arrange
        let adapter = ManualAdapter::new(AdapterStatus::Enabled);
        let (session, mut rx) = DiscoverySession::new(adapter.clone()).expect("session");
        session.start_scan().expect("start");

        // Act
        for address in ["AA:01", "AA:02", "aa:01", "AA:03", "AA:02"] {
            adapter.found(address);
        }

        // Assert
        let indices: Vec<usize> = drain(&mut rx)
            .into_iter()
            .map(|event| match event {
                DiscoveryEvent::PeerFound { index, .. } => index,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let addresses: Vec<String> = session
            .peers()
            .iter()
            .map(|p| p.address().to_string())
            .collect();
        assert_eq!(addresses, vec!["AA:01", "AA:02", "AA:03"]);
    }

    #[test]
    fn test_start_scan_clears_previous_results() {
        // Arrange
        let adapter = ManualAdapter::new(AdapterStatus::Enabled);
        let (session, mut rx) = DiscoverySession::new(adapter.clone()).expect("session");
        session.start_scan().expect("first scan");
        adapter.found("AA:01");
        adapter.found("AA:02");

        // Act
        session.start_scan().expect("second scan");
        let count_after_restart = session.peer_count();
        adapter.found("AA:02");

        // Assert
        assert_eq!(count_after_restart, 0);
        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&DiscoveryEvent::PeerFound {
                index: 0,
                peer: PeerIdentity::unnamed(PeerAddress::new("AA:02").expect("valid")),
            })
        );
        assert_eq!(*adapter.starts.lock().expect("lock poisoned"), 2);
    }

    #[test]
    fn test_callbacks_from_superseded_scan_are_dropped() {
        // Arrange
        let adapter = ManualAdapter::new(AdapterStatus::Enabled);
        let (session, mut rx) = DiscoverySession::new(adapter.clone()).expect("session");
        session.start_scan().expect("first scan");
        let old = adapter.listener();
        session.start_scan().expect("second scan");
        drain(&mut rx);

        // Act: the first scan's window runs out after the restart.
        old.peer_found(PeerIdentity::unnamed(PeerAddress::new("AA:09").expect("valid")));
        old.scan_finished();

        // Assert
        assert!(drain(&mut rx).is_empty());
        assert!(session.is_scanning());
        assert_eq!(session.peer_count(), 0);
        session.stop_scan();
        assert_eq!(*adapter.cancels.lock().expect("lock poisoned"), 1);
        assert_eq!(
            drain(&mut rx),
            vec![DiscoveryEvent::ScanFinished { peer_count: 0 }]
        );
    }

    #[test]
    fn test_stop_scan_keeps_results_and_clears_flag_on_finish() {
        // Arrange
        let adapter = ManualAdapter::new(AdapterStatus::Enabled);
        let (session, mut rx) = DiscoverySession::new(adapter.clone()).expect("session");
        session.start_scan().expect("start");
        adapter.found("AA:01");
        assert!(session.is_scanning());

        // Act
        session.stop_scan();

        // Assert
        assert!(!session.is_scanning());
        assert_eq!(session.peer_count(), 1);
        assert_eq!(
            drain(&mut rx).last(),
            Some(&DiscoveryEvent::ScanFinished { peer_count: 1 })
        );
    }

    #[test]
    fn test_stop_scan_without_running_scan_does_not_cancel() {
        let adapter = ManualAdapter::new(AdapterStatus::Enabled);
        let (session, _rx) = DiscoverySession::new(adapter.clone()).expect("session");

        session.stop_scan();

        assert_eq!(*adapter.cancels.lock().expect("lock poisoned"), 0);
    }

    #[test]
    fn test_failed_start_leaves_session_idle() {
        let adapter = ManualAdapter::failing();
        let (session, _rx) = DiscoverySession::new(adapter).expect("session");

        let result = session.start_scan();

        assert!(matches!(result, Err(DiscoveryError::ScanFailed(_))));
        assert!(!session.is_scanning());
    }

    #[test]
    fn test_peer_lookup_by_index() {
        let adapter = ManualAdapter::new(AdapterStatus::Enabled);
        let (session, _rx) = DiscoverySession::new(adapter.clone()).expect("session");
        session.start_scan().expect("start");
        adapter.found("AA:01");

        assert_eq!(
            session.peer(0).map(|p| p.address().to_string()),
            Some("AA:01".to_string())
        );
        assert!(session.peer(1).is_none());
    }

    #[test]
    fn test_drop_cancels_running_scan() {
        let adapter = ManualAdapter::new(AdapterStatus::Enabled);
        let (session, _rx) = DiscoverySession::new(adapter.clone()).expect("session");
        session.start_scan().expect("start");

        drop(session);

        assert_eq!(*adapter.cancels.lock().expect("lock poisoned"), 1);
    }
}
