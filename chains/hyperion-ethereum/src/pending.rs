use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ethers::types::H256;
use ethers::utils::keccak256;
use tracing::debug;

use hyperion_core::{ChainCommunicationError, ChainResult};

/// Tracks transaction inputs that were recently broadcast so the same
/// `submitBatch` or `updateValset` calldata is not sent twice while the first
/// one is still waiting to be mined.
#[derive(Clone, Debug)]
pub struct PendingInputs {
    seen: Arc<DashMap<H256, Instant>>,
    wait: Duration,
}

impl PendingInputs {
    /// Entries older than `wait` no longer block a resubmission.
    pub fn new(wait: Duration) -> Self {
        Self {
            seen: Arc::new(DashMap::new()),
            wait,
        }
    }

    /// The dedup window.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Record `data` as pending, failing with `DuplicatePending` if the same
    /// input was recorded within the window.
    pub fn check_and_insert(&self, data: &[u8]) -> ChainResult<H256> {
        let key = H256(keccak256(data));
        let now = Instant::now();
        match self.seen.entry(key) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.wait {
                    return Err(ChainCommunicationError::DuplicatePending(format!("{key:?}")));
                }
                debug!(input = ?key, "Pending input expired, accepting resubmission");
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }
        Ok(key)
    }

    /// Forget an input, e.g. after its transaction failed before broadcast.
    pub fn remove(&self, key: &H256) {
        self.seen.remove(key);
    }

    /// Drop every expired entry.
    pub fn prune(&self) {
        let wait = self.wait;
        self.seen.retain(|_, seen| seen.elapsed() < wait);
    }

    /// Number of tracked inputs.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
