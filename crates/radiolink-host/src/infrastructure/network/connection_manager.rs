//! ConnectionManager: one link session at a time, driven by a worker thread.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!  caller thread                      manager lock                    worker thread
//!  ─────────────                      ────────────                    ─────────────
//!  connect(peer) ──────────────► None -> ConnectStarting ──spawn──►  create_link()
//!                                                                    link.connect()   (blocks)
//!                                    ConnectStarting -> Connected ◄── ok
//!                                    ConnectStarting -> ConnectFailed ◄── err, close link
//!                                    ConnectFailed -> Disconnected  ◄── session retired
//!
//!  disconnect() ───────────────► Connected -> DisconnectStarting
//!                                          └── WorkerCommand::Close ──► link.close()
//!                                    DisconnectStarting -> Disconnected ◄── session retired
//! ```
//!
//! Every transition goes through one setter that holds the manager's mutex,
//! checks the move against the domain transition table, notifies the
//! [`StateObserver`], and on `Disconnected` retires the session.  The manager
//! is then idle again and accepts a fresh `connect()`.
//!
//! # Rules
//!
//! - `connect()`, `disconnect()` and `report_link_lost()` never block on radio
//!   I/O.  Calls that do not fit the current state are silently ignored.
//! - The worker owns the [`RadioLink`] exclusively.  The blocking `connect`
//!   and `close` calls run only on the worker thread.
//! - The worker does not spin: once connected it blocks on its command
//!   channel until it is told to close.
//! - The observer is called with the manager lock held, possibly from the
//!   worker thread.  It must not call back into the manager.
//!
//! # Known limitation
//!
//! A blocking connect already in progress cannot be aborted, so
//! `disconnect()` during `ConnectStarting` is a no-op.

use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use radiolink_core::{ConnectionState, PeerAddress, PeerIdentity, ServiceId, StateMachine};
use thiserror::Error;
use tokio::sync::mpsc as async_mpsc;
use tracing::{debug, info, warn};

use crate::infrastructure::radio::{LinkProvider, RadioLink};

/// Error type for connection management operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The worker thread could not be started.  The manager is idle again.
    #[error("failed to spawn link worker for {peer}: {source}")]
    WorkerSpawn {
        peer: PeerAddress,
        #[source]
        source: std::io::Error,
    },
}

/// Receives every connection state change, in order.
#[cfg_attr(test, mockall::automock)]
pub trait StateObserver: Send + Sync {
    fn on_state_changed(&self, state: ConnectionState);
}

impl<F> StateObserver for F
where
    F: Fn(ConnectionState) + Send + Sync,
{
    fn on_state_changed(&self, state: ConnectionState) {
        self(state)
    }
}

/// Observer that forwards states onto an unbounded Tokio channel.
pub struct ChannelObserver {
    tx: async_mpsc::UnboundedSender<ConnectionState>,
}

impl ChannelObserver {
    pub fn new(tx: async_mpsc::UnboundedSender<ConnectionState>) -> Self {
        Self { tx }
    }
}

impl StateObserver for ChannelObserver {
    fn on_state_changed(&self, state: ConnectionState) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.tx.send(state);
    }
}

/// Instructions from the manager to its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerCommand {
    Close,
}

/// The live worker of a session.
struct Session {
    peer: PeerAddress,
    commands: mpsc::Sender<WorkerCommand>,
    /// Set when the manager is dropped before the connect finished.
    abandoned: bool,
    // Dropped (detached) on retirement; the worker exits right after.
    _worker: JoinHandle<()>,
}

struct Inner {
    machine: StateMachine,
    session: Option<Session>,
}

/// State shared between the manager and its worker.
struct Shared {
    inner: Mutex<Inner>,
    observer: Arc<dyn StateObserver>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `next` while the caller holds the lock.
    ///
    /// Returns `false` when the transition is not in the table; nothing is
    /// notified in that case.
    fn apply(&self, inner: &mut Inner, next: ConnectionState) -> bool {
        let previous = match inner.machine.transition(next) {
            Ok(previous) => previous,
            Err(e) => {
                warn!("{e}");
                return false;
            }
        };
        debug!(from = %previous, to = %next, "connection state changed");
        self.observer.on_state_changed(next);

        if next.is_terminal() {
            if let Some(session) = inner.session.take() {
                info!(peer = %session.peer, "link session retired");
            }
        }
        true
    }

    fn set_state(&self, next: ConnectionState) -> bool {
        let mut inner = self.lock();
        self.apply(&mut inner, next)
    }

    /// Moves to `Connected`.  Returns `true` when the session was abandoned
    /// meanwhile and the worker should close straight away.
    fn connected(&self) -> bool {
        let mut inner = self.lock();
        self.apply(&mut inner, ConnectionState::Connected);
        let abandoned = inner.session.as_ref().is_some_and(|s| s.abandoned);
        if abandoned {
            self.apply(&mut inner, ConnectionState::DisconnectStarting);
        }
        abandoned
    }

    /// Makes sure the state is a closing one before the worker closes.
    fn ensure_closing(&self) {
        let mut inner = self.lock();
        if !inner.machine.current().is_closing() {
            self.apply(&mut inner, ConnectionState::DisconnectStarting);
        }
    }
}

/// Owns at most one link session and reports its state transitions.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    links: Arc<dyn LinkProvider>,
    service: ServiceId,
}

impl ConnectionManager {
    /// Creates an idle manager that opens links for `service` through `links`
    /// and reports every state change to `observer`.
    pub fn new(
        links: Arc<dyn LinkProvider>,
        service: ServiceId,
        observer: Arc<dyn StateObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    machine: StateMachine::new(),
                    session: None,
                }),
                observer,
            }),
            links,
            service,
        }
    }

    /// Creates a manager that reports state changes on a channel, and returns
    /// it together with the receiver.
    pub fn with_channel(
        links: Arc<dyn LinkProvider>,
        service: ServiceId,
    ) -> (Self, async_mpsc::UnboundedReceiver<ConnectionState>) {
        let (tx, rx) = async_mpsc::unbounded_channel();
        let manager = Self::new(links, service, Arc::new(ChannelObserver::new(tx)));
        (manager, rx)
    }

    /// Starts connecting to `peer` on a new worker thread.
    ///
    /// Returns `Ok(true)` when a session was started and `Ok(false)` when the
    /// manager already has a session (the call is ignored).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::WorkerSpawn`] when the worker thread cannot
    /// be started.  The observer has then seen `ConnectStarting`,
    /// `ConnectFailed` and `Disconnected`.
    pub fn connect(&self, peer: PeerIdentity) -> Result<bool, ConnectionError> {
        let mut inner = self.shared.lock();
        if inner.session.is_some() {
            debug!(peer = %peer.address(), state = %inner.machine.current(), "connect ignored: session active");
            return Ok(false);
        }
        // A finished session leaves the machine in Disconnected.
        inner.machine.reset();
        if !self.shared.apply(&mut inner, ConnectionState::ConnectStarting) {
            return Ok(false);
        }

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let links = Arc::clone(&self.links);
        let service = self.service;
        let address = peer.address().clone();
        let spawned = thread::Builder::new()
            .name(format!("radiolink-link-{address}"))
            .spawn(move || run_worker(shared, links, peer, service, rx));

        match spawned {
            Ok(handle) => {
                info!(peer = %address, %service, "link worker started");
                inner.session = Some(Session {
                    peer: address,
                    commands: tx,
                    abandoned: false,
                    _worker: handle,
                });
                Ok(true)
            }
            Err(source) => {
                self.shared.apply(&mut inner, ConnectionState::ConnectFailed);
                self.shared.apply(&mut inner, ConnectionState::Disconnected);
                Err(ConnectionError::WorkerSpawn {
                    peer: address,
                    source,
                })
            }
        }
    }

    /// Asks the worker to close an open link.  Ignored unless `Connected`.
    pub fn disconnect(&self) {
        self.begin_close(ConnectionState::DisconnectStarting);
    }

    /// Tells the manager the peer dropped the link.  Ignored unless
    /// `Connected`.
    pub fn report_link_lost(&self) {
        self.begin_close(ConnectionState::ConnectionLost);
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().machine.current()
    }

    /// `true` while a worker session exists.
    pub fn is_active(&self) -> bool {
        self.shared.lock().session.is_some()
    }

    fn begin_close(&self, next: ConnectionState) {
        let mut inner = self.shared.lock();
        let current = inner.machine.current();
        if current != ConnectionState::Connected {
            debug!(state = %current, requested = %next, "close request ignored");
            return;
        }
        self.shared.apply(&mut inner, next);
        if let Some(session) = inner.session.as_ref() {
            // The worker holds the receiver until it retires the session.
            let _ = session.commands.send(WorkerCommand::Close);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        match inner.machine.current() {
            ConnectionState::Connected => {
                self.shared.apply(&mut inner, ConnectionState::DisconnectStarting);
                if let Some(session) = inner.session.as_ref() {
                    let _ = session.commands.send(WorkerCommand::Close);
                }
            }
            ConnectionState::ConnectStarting => {
                if let Some(session) = inner.session.as_mut() {
                    session.abandoned = true;
                }
            }
            _ => {}
        }
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

fn run_worker(
    shared: Arc<Shared>,
    links: Arc<dyn LinkProvider>,
    peer: PeerIdentity,
    service: ServiceId,
    commands: mpsc::Receiver<WorkerCommand>,
) {
    let mut link = match links.create_link(&peer, service) {
        Ok(link) => link,
        Err(e) => {
            warn!(peer = %peer.address(), error = %e, "link creation failed");
            shared.set_state(ConnectionState::ConnectFailed);
            shared.set_state(ConnectionState::Disconnected);
            return;
        }
    };

    if let Err(e) = link.connect() {
        warn!(peer = %peer.address(), error = %e, "connect failed");
        shared.set_state(ConnectionState::ConnectFailed);
        close_link(link.as_mut());
        shared.set_state(ConnectionState::Disconnected);
        return;
    }

    info!(peer = %peer.address(), "link connected");
    if !shared.connected() {
        match commands.recv() {
            Ok(WorkerCommand::Close) => debug!(peer = %peer.address(), "close requested"),
            Err(_) => debug!(peer = %peer.address(), "command channel closed"),
        }
        shared.ensure_closing();
    }

    close_link(link.as_mut());
    shared.set_state(ConnectionState::Disconnected);
    debug!(peer = %peer.address(), "link worker exiting");
}

fn close_link(link: &mut dyn RadioLink) {
    match link.close() {
        Ok(()) => debug!(peer = %link.peer(), "link closed"),
        Err(e) => warn!(peer = %link.peer(), error = %e, "closing link failed"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use mockall::{predicate::eq, Sequence};
    use radiolink_core::HID_SERVICE;

    use crate::infrastructure::radio::simulated::{SimulatedPeer, SimulatedRadio};
    use crate::infrastructure::radio::AdapterStatus;

    const WAIT: Duration = Duration::from_secs(5);

    fn identity(address: &str) -> PeerIdentity {
        PeerIdentity::unnamed(PeerAddress::new(address).expect("valid address"))
    }

    fn radio_with(peer: SimulatedPeer) -> SimulatedRadio {
        SimulatedRadio::new(AdapterStatus::Enabled).with_peer(peer)
    }

    /// Observer that forwards states onto a std channel for blocking waits.
    fn recording_observer() -> (Arc<dyn StateObserver>, mpsc::Receiver<ConnectionState>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let observer: Arc<dyn StateObserver> = Arc::new(move |state: ConnectionState| {
            let _ = tx.lock().expect("lock poisoned").send(state);
        });
        (observer, rx)
    }

    fn next_states(rx: &mpsc::Receiver<ConnectionState>, n: usize) -> Vec<ConnectionState> {
        (0..n)
            .map(|_| rx.recv_timeout(WAIT).expect("state change"))
            .collect()
    }

    #[test]
    fn test_disconnect_on_fresh_manager_is_a_no_op() {
        // Arrange
        let mut observer = MockStateObserver::new();
        observer.expect_on_state_changed().times(0);
        let radio = SimulatedRadio::new(AdapterStatus::Enabled);
        let manager = ConnectionManager::new(Arc::new(radio), HID_SERVICE, Arc::new(observer));

        // Act
        manager.disconnect();
        manager.report_link_lost();

        // Assert
        assert_eq!(manager.state(), ConnectionState::None);
        assert!(!manager.is_active());
    }

    #[test]
    fn test_failed_connect_reports_failure_then_disconnected() {
        // Arrange
        let radio = radio_with(SimulatedPeer::new(identity("AA:BB")).unreachable());
        let (observer, rx) = recording_observer();
        let manager = ConnectionManager::new(Arc::new(radio.clone()), HID_SERVICE, observer);

        // Act
        let started = manager.connect(identity("AA:BB")).expect("spawn");

        // Assert
        assert!(started);
        assert_eq!(
            next_states(&rx, 3),
            vec![
                ConnectionState::ConnectStarting,
                ConnectionState::ConnectFailed,
                ConnectionState::Disconnected,
            ]
        );
        assert_eq!(radio.stats().closes, 1);
    }

    #[test]
    fn test_manager_accepts_fresh_connect_after_failure() {
        // Arrange
        let radio = radio_with(SimulatedPeer::new(identity("AA:BB")).unreachable());
        let (observer, rx) = recording_observer();
        let manager = ConnectionManager::new(Arc::new(radio.clone()), HID_SERVICE, observer);
        manager.connect(identity("AA:BB")).expect("spawn");
        next_states(&rx, 3);

        // Act
        let restarted = manager.connect(identity("AA:BB")).expect("spawn");

        // Assert
        assert!(restarted);
        assert_eq!(rx.recv_timeout(WAIT), Ok(ConnectionState::ConnectStarting));
        assert_eq!(radio.stats().links_created, 2);
    }

    #[test]
    fn test_connect_then_disconnect_closes_link_once() {
        // Arrange
        let radio = radio_with(SimulatedPeer::new(identity("AA:BB")));
        let (observer, rx) = recording_observer();
        let manager = ConnectionManager::new(Arc::new(radio.clone()), HID_SERVICE, observer);
        manager.connect(identity("AA:BB")).expect("spawn");
        assert_eq!(
            next_states(&rx, 2),
            vec![ConnectionState::ConnectStarting, ConnectionState::Connected]
        );

        // Act
        manager.disconnect();

        // Assert
        assert_eq!(
            next_states(&rx, 2),
            vec![
                ConnectionState::DisconnectStarting,
                ConnectionState::Disconnected
            ]
        );
        assert_eq!(radio.stats().closes, 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_active());
    }

    #[test]
    fn test_link_lost_closes_link_and_reaches_disconnected() {
        // Arrange
        let radio = radio_with(SimulatedPeer::new(identity("AA:BB")));
        let (observer, rx) = recording_observer();
        let manager = ConnectionManager::new(Arc::new(radio.clone()), HID_SERVICE, observer);
        manager.connect(identity("AA:BB")).expect("spawn");
        next_states(&rx, 2);

        // Act
        manager.report_link_lost();

        // Assert
        assert_eq!(
            next_states(&rx, 2),
            vec![ConnectionState::ConnectionLost, ConnectionState::Disconnected]
        );
        assert_eq!(radio.stats().closes, 1);
    }

    #[test]
    fn test_second_connect_while_active_is_ignored() {
        // Arrange
        let radio = radio_with(
            SimulatedPeer::new(identity("AA:BB")).with_connect_delay(Duration::from_millis(100)),
        );
        let starts = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&starts);
        let observer = move |state: ConnectionState| {
            if state == ConnectionState::ConnectStarting {
                counted.fetch_add(1, Ordering::SeqCst);
            }
        };
        let manager = ConnectionManager::new(Arc::new(radio.clone()), HID_SERVICE, Arc::new(observer));

        // Act
        let first = manager.connect(identity("AA:BB")).expect("spawn");
        let second = manager.connect(identity("AA:BB")).expect("spawn");

        // Assert
        assert!(first);
        assert!(!second);
        assert!(manager.is_active());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(radio.stats().links_created, 1);
    }

    #[test]
    fn test_failure_path_notifies_observer_in_order() {
        // Arrange
        let radio = radio_with(SimulatedPeer::new(identity("AA:BB")).unreachable());
        let (done_tx, done_rx) = mpsc::channel();
        let mut seq = Sequence::new();
        let mut observer = MockStateObserver::new();
        observer
            .expect_on_state_changed()
            .with(eq(ConnectionState::ConnectStarting))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer
            .expect_on_state_changed()
            .with(eq(ConnectionState::ConnectFailed))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer
            .expect_on_state_changed()
            .with(eq(ConnectionState::Disconnected))
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                let _ = done_tx.send(());
            });
        let manager = ConnectionManager::new(Arc::new(radio), HID_SERVICE, Arc::new(observer));

        // Act
        manager.connect(identity("AA:BB")).expect("spawn");

        // Assert
        done_rx.recv_timeout(WAIT).expect("worker finished");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_during_connect_is_ignored() {
        // Arrange
        let radio = radio_with(
            SimulatedPeer::new(identity("AA:BB")).with_connect_delay(Duration::from_millis(100)),
        );
        let (observer, rx) = recording_observer();
        let manager = ConnectionManager::new(Arc::new(radio), HID_SERVICE, observer);
        manager.connect(identity("AA:BB")).expect("spawn");

        // Act
        manager.disconnect();

        // Assert
        assert_eq!(
            next_states(&rx, 2),
            vec![ConnectionState::ConnectStarting, ConnectionState::Connected]
        );
        assert_eq!(manager.state(), ConnectionState::Connected);
        manager.disconnect();
        assert_eq!(
            next_states(&rx, 2),
            vec![
                ConnectionState::DisconnectStarting,
                ConnectionState::Disconnected
            ]
        );
    }

    #[test]
    fn test_failing_close_still_reaches_disconnected() {
        let radio = radio_with(SimulatedPeer::new(identity("AA:BB")).with_failing_close());
        let (observer, rx) = recording_observer();
        let manager = ConnectionManager::new(Arc::new(radio.clone()), HID_SERVICE, observer);
        manager.connect(identity("AA:BB")).expect("spawn");
        next_states(&rx, 2);

        manager.disconnect();

        assert_eq!(
            next_states(&rx, 2),
            vec![
                ConnectionState::DisconnectStarting,
                ConnectionState::Disconnected
            ]
        );
        assert_eq!(radio.stats().closes, 1);
    }

    #[test]
    fn test_link_creation_failure_reports_connect_failed() {
        let radio = SimulatedRadio::new(AdapterStatus::Disabled);
        let (observer, rx) = recording_observer();
        let manager = ConnectionManager::new(Arc::new(radio.clone()), HID_SERVICE, observer);

        manager.connect(identity("AA:BB")).expect("spawn");

        assert_eq!(
            next_states(&rx, 3),
            vec![
                ConnectionState::ConnectStarting,
                ConnectionState::ConnectFailed,
                ConnectionState::Disconnected,
            ]
        );
        assert_eq!(radio.stats().closes, 0);
    }

    #[test]
    fn test_dropping_connected_manager_closes_link() {
        // Arrange
        let radio = radio_with(SimulatedPeer::new(identity("AA:BB")));
        let (observer, rx) = recording_observer();
        let manager = ConnectionManager::new(Arc::new(radio.clone()), HID_SERVICE, observer);
        manager.connect(identity("AA:BB")).expect("spawn");
        next_states(&rx, 2);

        // Act
        drop(manager);

        // Assert
        assert_eq!(
            next_states(&rx, 2),
            vec![
                ConnectionState::DisconnectStarting,
                ConnectionState::Disconnected
            ]
        );
        assert_eq!(radio.stats().closes, 1);
    }

    #[test]
    fn test_dropping_manager_mid_connect_closes_after_connect() {
        // Arrange
        let radio = radio_with(
            SimulatedPeer::new(identity("AA:BB")).with_connect_delay(Duration::from_millis(100)),
        );
        let (observer, rx) = recording_observer();
        let manager = ConnectionManager::new(Arc::new(radio.clone()), HID_SERVICE, observer);
        manager.connect(identity("AA:BB")).expect("spawn");

        // Act
        drop(manager);

        // Assert
        assert_eq!(
            next_states(&rx, 4),
            vec![
                ConnectionState::ConnectStarting,
                ConnectionState::Connected,
                ConnectionState::DisconnectStarting,
                ConnectionState::Disconnected,
            ]
        );
        assert_eq!(radio.stats().closes, 1);
    }

    #[tokio::test]
    async fn test_with_channel_delivers_states_to_async_receiver() {
        // Arrange
        let radio = radio_with(SimulatedPeer::new(identity("AA:BB")).unreachable());
        let (manager, mut rx) = ConnectionManager::with_channel(Arc::new(radio), HID_SERVICE);

        // Act
        manager.connect(identity("AA:BB")).expect("spawn");

        // Assert
        let mut seen = Vec::new();
        while let Ok(Some(state)) = tokio::time::timeout(WAIT, rx.recv()).await {
            seen.push(state);
            if state == ConnectionState::Disconnected {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![
                ConnectionState::ConnectStarting,
                ConnectionState::ConnectFailed,
                ConnectionState::Disconnected,
            ]
        );
    }
}
