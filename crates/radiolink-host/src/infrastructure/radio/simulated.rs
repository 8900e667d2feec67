//! Simulated radio for tests and for running the host without hardware.
//!
//! [`SimulatedRadio`] plays back a fixed list of [`SimulatedPeer`]s:
//!
//! - A scan runs on a named background thread (`radiolink-sim-scan`).  Each
//!   peer is reported `sightings` times, round-robin, one report every
//!   `advertise_interval`, and the scan finishes when the scan window elapses
//!   or when it is cancelled.
//! - Links connect after the peer's `connect_delay` (or fail after the
//!   connect timeout when the delay is longer), fail when the peer is not
//!   reachable, and can be told to fail on close.
//!
//! Every call is counted in [`SimulatedRadioStats`] so tests can assert, for
//! example, that a link was closed exactly once.
//!
//! `SimulatedRadio` is cheap to clone.  Clones share the counters and the
//! running scan, so one clone can be handed to a discovery session as a
//! [`RadioAdapter`] and another to a connection manager as a [`LinkProvider`].

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc::{self, RecvTimeoutError},
    Arc, Mutex, PoisonError,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use radiolink_core::{PeerAddress, PeerIdentity, ServiceId, HID_SERVICE};
use tracing::{debug, info, warn};

use super::{
    AdapterStatus, DiscoveryListener, LinkError, LinkProvider, RadioAdapter, RadioError, RadioLink,
};
use crate::infrastructure::storage::config::{AdapterSetting, AppConfig};

/// Behaviour of one simulated peer.
#[derive(Debug, Clone)]
pub struct SimulatedPeer {
    identity: PeerIdentity,
    reachable: bool,
    connect_delay: Duration,
    sightings: u32,
    fail_close: bool,
    services: Vec<ServiceId>,
}

impl SimulatedPeer {
    /// A reachable peer that is seen once per scan, connects immediately, and
    /// advertises the HID service.
    pub fn new(identity: PeerIdentity) -> Self {
        Self {
            identity,
            reachable: true,
            connect_delay: Duration::ZERO,
            sightings: 1,
            fail_close: false,
            services: vec![HID_SERVICE],
        }
    }

    /// Connect attempts to this peer fail.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Number of times each scan reports this peer.  Zero hides it from scans.
    pub fn with_sightings(mut self, sightings: u32) -> Self {
        self.sightings = sightings;
        self
    }

    /// Closing a link to this peer reports an error.
    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn with_services(mut self, services: Vec<ServiceId>) -> Self {
        self.services = services;
        self
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }
}

/// Snapshot of the simulated radio's call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedRadioStats {
    pub scans_started: usize,
    pub scans_cancelled: usize,
    pub links_created: usize,
    pub connect_attempts: usize,
    pub closes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    scans_started: AtomicUsize,
    scans_cancelled: AtomicUsize,
    links_created: AtomicUsize,
    connect_attempts: AtomicUsize,
    closes: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Why a running scan thread is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanStop {
    /// `cancel_discovery`: report `scan_finished`.
    Cancelled,
    /// A new scan replaces this one: stop quietly.
    Superseded,
}

struct ActiveScan {
    stop: mpsc::Sender<ScanStop>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    counters: Counters,
    scan: Mutex<Option<ActiveScan>>,
}

/// A radio adapter and link provider backed by a configured peer list.
#[derive(Clone)]
pub struct SimulatedRadio {
    status: AdapterStatus,
    peers: Vec<SimulatedPeer>,
    scan_window: Duration,
    advertise_interval: Duration,
    connect_timeout: Option<Duration>,
    shared: Arc<Shared>,
}

impl SimulatedRadio {
    /// Creates a radio with no peers, a 12 second scan window, and no
    /// delay between sightings.
    pub fn new(status: AdapterStatus) -> Self {
        Self {
            status,
            peers: Vec::new(),
            scan_window: Duration::from_secs(12),
            advertise_interval: Duration::ZERO,
            connect_timeout: None,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Builds the radio described by the `[simulated]`, `[scan]`, and
    /// `[link]` config sections.
    pub fn from_config(config: &AppConfig) -> Self {
        let status = match config.simulated.adapter {
            AdapterSetting::Enabled => AdapterStatus::Enabled,
            AdapterSetting::Disabled => AdapterStatus::Disabled,
            AdapterSetting::Absent => AdapterStatus::Absent,
        };

        let mut radio = Self::new(status)
            .with_scan_window(Duration::from_secs(config.scan.window_secs))
            .with_advertise_interval(Duration::from_millis(config.scan.advertise_interval_ms))
            .with_connect_timeout(Duration::from_millis(config.link.connect_timeout_ms));

        for entry in &config.simulated.peers {
            let identity = PeerIdentity::new(entry.address.clone(), entry.name.clone());
            let mut peer = SimulatedPeer::new(identity)
                .with_connect_delay(Duration::from_millis(entry.connect_delay_ms))
                .with_sightings(entry.repeat_sightings);
            if !entry.reachable {
                peer = peer.unreachable();
            }
            radio = radio.with_peer(peer);
        }
        radio
    }

    pub fn with_peer(mut self, peer: SimulatedPeer) -> Self {
        self.peers.push(peer);
        self
    }

    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    pub fn with_advertise_interval(mut self, interval: Duration) -> Self {
        self.advertise_interval = interval;
        self
    }

    /// Connect attempts whose delay exceeds `timeout` fail after `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn peers(&self) -> &[SimulatedPeer] {
        &self.peers
    }

    pub fn stats(&self) -> SimulatedRadioStats {
        let c = &self.shared.counters;
        SimulatedRadioStats {
            scans_started: c.scans_started.load(Ordering::SeqCst),
            scans_cancelled: c.scans_cancelled.load(Ordering::SeqCst),
            links_created: c.links_created.load(Ordering::SeqCst),
            connect_attempts: c.connect_attempts.load(Ordering::SeqCst),
            closes: c.closes.load(Ordering::SeqCst),
        }
    }

    fn profile(&self, address: &PeerAddress) -> Option<&SimulatedPeer> {
        self.peers.iter().find(|p| p.identity.address() == address)
    }

    /// Sightings in round-robin order: every peer once, then every peer that
    /// still has sightings left, and so on.
    fn sighting_order(&self) -> Vec<PeerIdentity> {
        let rounds = self.peers.iter().map(|p| p.sightings).max().unwrap_or(0);
        let mut order = Vec::new();
        for round in 0..rounds {
            for peer in self.peers.iter().filter(|p| p.sightings > round) {
                order.push(peer.identity.clone());
            }
        }
        order
    }

    /// Stops the running scan thread and waits for it to exit.
    ///
    /// Returns `true` when a live scan received the stop request.
    fn stop_scan(slot: &mut Option<ActiveScan>, reason: ScanStop) -> bool {
        let Some(active) = slot.take() else {
            return false;
        };
        let delivered = active.stop.send(reason).is_ok();
        if active.worker.join().is_err() {
            warn!("simulated scan thread panicked");
        }
        delivered
    }
}

impl RadioAdapter for SimulatedRadio {
    fn status(&self) -> AdapterStatus {
        self.status
    }

    fn start_discovery(&self, listener: Arc<dyn DiscoveryListener>) -> Result<(), RadioError> {
        if !self.status.is_enabled() {
            return Err(RadioError::Unavailable(self.status));
        }

        let mut slot = self.shared.scan.lock().unwrap_or_else(PoisonError::into_inner);
        if Self::stop_scan(&mut slot, ScanStop::Superseded) {
            debug!("simulated scan restarted");
        }

        let plan = ScanPlan {
            sightings: self.sighting_order(),
            interval: self.advertise_interval,
            window: self.scan_window,
        };
        let (stop_tx, stop_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("radiolink-sim-scan".to_string())
            .spawn(move || run_scan(plan, listener, stop_rx))
            .map_err(RadioError::ScanThread)?;

        Counters::bump(&self.shared.counters.scans_started);
        *slot = Some(ActiveScan {
            stop: stop_tx,
            worker,
        });
        info!(
            peers = self.peers.len(),
            window_ms = self.scan_window.as_millis() as u64,
            "simulated scan started"
        );
        Ok(())
    }

    fn cancel_discovery(&self) {
        let mut slot = self.shared.scan.lock().unwrap_or_else(PoisonError::into_inner);
        if Self::stop_scan(&mut slot, ScanStop::Cancelled) {
            Counters::bump(&self.shared.counters.scans_cancelled);
            debug!("simulated scan cancelled");
        }
    }
}

impl LinkProvider for SimulatedRadio {
    fn create_link(
        &self,
        peer: &PeerIdentity,
        service: ServiceId,
    ) -> Result<Box<dyn RadioLink>, LinkError> {
        if !self.status.is_enabled() {
            return Err(LinkError::AdapterUnavailable {
                peer: peer.address().clone(),
                status: self.status,
            });
        }
        Counters::bump(&self.shared.counters.links_created);

        // Unknown addresses get a link that never answers.
        let behaviour = match self.profile(peer.address()) {
            Some(profile) => LinkBehaviour {
                reachable: profile.reachable,
                connect_delay: profile.connect_delay,
                fail_close: profile.fail_close,
            },
            None => LinkBehaviour {
                reachable: false,
                connect_delay: Duration::ZERO,
                fail_close: false,
            },
        };
        debug!(peer = %peer.address(), %service, "simulated link created");

        Ok(Box::new(SimulatedLink {
            peer: peer.address().clone(),
            behaviour,
            connect_timeout: self.connect_timeout,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn advertised_services(&self, peer: &PeerIdentity) -> Vec<ServiceId> {
        self.profile(peer.address())
            .map(|p| p.services.clone())
            .unwrap_or_default()
    }
}

// ── Scan thread ───────────────────────────────────────────────────────────────

struct ScanPlan {
    sightings: Vec<PeerIdentity>,
    interval: Duration,
    window: Duration,
}

enum Wait {
    Elapsed,
    Finish,
    Abandon,
}

fn wait_for_stop(stop: &mpsc::Receiver<ScanStop>, timeout: Duration) -> Wait {
    match stop.recv_timeout(timeout) {
        Err(RecvTimeoutError::Timeout) => Wait::Elapsed,
        Ok(ScanStop::Cancelled) => Wait::Finish,
        Ok(ScanStop::Superseded) | Err(RecvTimeoutError::Disconnected) => Wait::Abandon,
    }
}

fn run_scan(plan: ScanPlan, listener: Arc<dyn DiscoveryListener>, stop: mpsc::Receiver<ScanStop>) {
    let deadline = Instant::now() + plan.window;

    for peer in plan.sightings {
        if Instant::now() >= deadline {
            break;
        }
        listener.peer_found(peer);
        match wait_for_stop(&stop, plan.interval) {
            Wait::Elapsed => {}
            Wait::Finish => {
                listener.scan_finished();
                return;
            }
            Wait::Abandon => return,
        }
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    match wait_for_stop(&stop, remaining) {
        Wait::Elapsed | Wait::Finish => listener.scan_finished(),
        Wait::Abandon => {}
    }
}

// ── Links ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct LinkBehaviour {
    reachable: bool,
    connect_delay: Duration,
    fail_close: bool,
}

struct SimulatedLink {
    peer: PeerAddress,
    behaviour: LinkBehaviour,
    connect_timeout: Option<Duration>,
    shared: Arc<Shared>,
}

impl RadioLink for SimulatedLink {
    fn peer(&self) -> &PeerAddress {
        &self.peer
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        Counters::bump(&self.shared.counters.connect_attempts);

        if let Some(timeout) = self.connect_timeout {
            if self.behaviour.connect_delay > timeout {
                thread::sleep(timeout);
                return Err(LinkError::ConnectFailed {
                    peer: self.peer.clone(),
                    reason: format!("no answer within {} ms", timeout.as_millis()),
                });
            }
        }

        thread::sleep(self.behaviour.connect_delay);
        if !self.behaviour.reachable {
            return Err(LinkError::ConnectFailed {
                peer: self.peer.clone(),
                reason: "peer did not accept the connection".to_string(),
            });
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        Counters::bump(&self.shared.counters.closes);
        if self.behaviour.fail_close {
            return Err(LinkError::CloseFailed {
                peer: self.peer.clone(),
                reason: "socket was already reset".to_string(),
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
