use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use strum::{Display, EnumIter, IntoStaticStr};

use hyperion_core::{BridgeLocator, Valset};

/// The control loops of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum LoopKind {
    Oracle,
    Signer,
    BatchCreator,
    ValsetManager,
    Relayer,
    ExternalData,
    Skipped,
    Updater,
}

impl LoopKind {
    /// Label used in logs, metrics and stats.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// What the last iteration of a loop did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopStatus {
    pub status: String,
    pub iterations: u64,
    pub last_execution: Option<DateTime<Utc>>,
    pub next_execution: Option<DateTime<Utc>>,
}

/// Runtime state of one orchestrator instance, written by its loops and read
/// by the admin API.
#[derive(Debug)]
pub struct OrchestratorState {
    locator: BridgeLocator,
    started_at: DateTime<Utc>,
    counters: Mutex<BTreeMap<String, u64>>,
    loops: Mutex<BTreeMap<LoopKind, LoopStatus>>,
    last_scanned_height: AtomicU64,
    last_observed_event_nonce: AtomicU64,
    latest_counterparty_height: AtomicU64,
    synced: AtomicBool,
    considered_synced: AtomicBool,
    error_status: Mutex<Option<String>>,
    eth_valset: Mutex<Option<Valset>>,
}

/// Point in time copy of `OrchestratorState`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub hyperion_id: u64,
    pub chain_id: u64,
    pub started_at: DateTime<Utc>,
    pub counters: BTreeMap<String, u64>,
    pub loops: BTreeMap<String, LoopStatus>,
    pub last_scanned_height: u64,
    pub last_observed_event_nonce: u64,
    pub latest_counterparty_height: u64,
    pub synced: bool,
    pub considered_synced: bool,
    pub error_status: Option<String>,
    pub eth_valset_nonce: Option<u64>,
}

impl OrchestratorState {
    pub fn new(locator: BridgeLocator) -> Self {
        Self {
            locator,
            started_at: Utc::now(),
            counters: Default::default(),
            loops: Default::default(),
            last_scanned_height: AtomicU64::new(0),
            last_observed_event_nonce: AtomicU64::new(0),
            latest_counterparty_height: AtomicU64::new(0),
            synced: AtomicBool::new(false),
            considered_synced: AtomicBool::new(false),
            error_status: Mutex::new(None),
            eth_valset: Mutex::new(None),
        }
    }

    pub fn locator(&self) -> BridgeLocator {
        self.locator
    }

    pub fn add(&self, counter: &str, by: u64) {
        *self.counters.lock().entry(counter.to_owned()).or_default() += by;
    }

    pub fn counter(&self, counter: &str) -> u64 {
        self.counters.lock().get(counter).copied().unwrap_or_default()
    }

    pub fn loop_started(&self, kind: LoopKind) {
        let mut loops = self.loops.lock();
        let status = loops.entry(kind).or_default();
        status.iterations += 1;
        status.last_execution = Some(Utc::now());
        status.status = "running".into();
    }

    pub fn loop_finished(&self, kind: LoopKind, status: impl Into<String>, next_in: Duration) {
        let next = chrono::Duration::from_std(next_in)
            .ok()
            .map(|d| Utc::now() + d);
        let mut loops = self.loops.lock();
        let entry = loops.entry(kind).or_default();
        entry.status = status.into();
        entry.next_execution = next;
    }

    pub fn loop_status(&self, kind: LoopKind) -> Option<LoopStatus> {
        self.loops.lock().get(&kind).cloned()
    }

    pub fn set_last_scanned_height(&self, height: u64) {
        self.last_scanned_height.store(height, Ordering::Relaxed);
    }

    pub fn last_scanned_height(&self) -> u64 {
        self.last_scanned_height.load(Ordering::Relaxed)
    }

    pub fn set_last_observed_event_nonce(&self, nonce: u64) {
        self.last_observed_event_nonce.store(nonce, Ordering::Relaxed);
    }

    pub fn set_latest_counterparty_height(&self, height: u64) {
        self.latest_counterparty_height
            .fetch_max(height, Ordering::Relaxed);
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Relaxed);
    }

    pub fn set_considered_synced(&self, considered: bool) {
        self.considered_synced.store(considered, Ordering::Relaxed);
    }

    /// Checkpoints agree, or there is nothing the valset manager needs to do.
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Relaxed) || self.considered_synced.load(Ordering::Relaxed)
    }

    pub fn set_error_status(&self, error: impl Into<String>) {
        *self.error_status.lock() = Some(error.into());
    }

    pub fn clear_error_status(&self) {
        *self.error_status.lock() = None;
    }

    pub fn error_status(&self) -> Option<String> {
        self.error_status.lock().clone()
    }

    /// Counterparty valset whose checkpoint matches the contract, if known.
    pub fn eth_valset(&self) -> Option<Valset> {
        self.eth_valset.lock().clone()
    }

    pub fn set_eth_valset(&self, valset: Option<Valset>) {
        *self.eth_valset.lock() = valset;
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            hyperion_id: self.locator.hyperion_id,
            chain_id: self.locator.chain_id,
            started_at: self.started_at,
            counters: self.counters.lock().clone(),
            loops: self
                .loops
                .lock()
                .iter()
                .map(|(kind, status)| (kind.to_string(), status.clone()))
                .collect(),
            last_scanned_height: self.last_scanned_height(),
            last_observed_event_nonce: self.last_observed_event_nonce.load(Ordering::Relaxed),
            latest_counterparty_height: self.latest_counterparty_height.load(Ordering::Relaxed),
            synced: self.synced.load(Ordering::Relaxed),
            considered_synced: self.considered_synced.load(Ordering::Relaxed),
            error_status: self.error_status(),
            eth_valset_nonce: self.eth_valset.lock().as_ref().map(|v| v.nonce),
        }
    }
}
