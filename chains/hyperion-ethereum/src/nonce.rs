//! Per-sender nonce bookkeeping.
//!
//! Every state-changing submission holds the sender's entry exclusively from
//! the moment it reads the nonce until it either increments it or gives up,
//! so two submissions for the same sender never share a nonce.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use ethers::types::{Address, U256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use hyperion_core::ChainResult;

/// Cache of the next pending nonce of every sender.
#[derive(Clone, Debug, Default)]
pub struct NonceCache {
    nonces: Arc<DashMap<Address, Arc<Mutex<Option<U256>>>>>,
}

/// Exclusive access to one sender's nonce.
#[derive(Debug)]
pub struct NonceGuard {
    sender: Address,
    nonce: OwnedMutexGuard<Option<U256>>,
}

impl NonceCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, sender: Address) -> Arc<Mutex<Option<U256>>> {
        // Only hold the dashmap shard lock long enough to clone the `Arc`.
        let entry = self
            .nonces
            .entry(sender)
            .or_insert_with(|| Arc::new(Mutex::new(None)));
        Arc::clone(entry.value())
    }

    /// Acquire the sender's critical section, fetching the pending nonce with
    /// `fetch` the first time the sender is seen.
    pub async fn lock<F, Fut>(&self, sender: Address, fetch: F) -> ChainResult<NonceGuard>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ChainResult<U256>>,
    {
        let mut nonce = self.entry(sender).lock_owned().await;
        if nonce.is_none() {
            let fetched = fetch().await?;
            info!(?sender, nonce = %fetched, "Initialized sender nonce");
            *nonce = Some(fetched);
        }
        Ok(NonceGuard { sender, nonce })
    }

    /// Current cached nonce without taking the critical section for long.
    pub async fn peek(&self, sender: Address) -> Option<U256> {
        *self.entry(sender).lock().await
    }

    /// Overwrite the cached nonce.
    pub async fn set(&self, sender: Address, nonce: U256) {
        *self.entry(sender).lock().await = Some(nonce);
    }
}

impl NonceGuard {
    /// The sender this guard belongs to.
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Nonce the next transaction must use.
    pub fn nonce(&self) -> U256 {
        self.nonce.unwrap_or_default()
    }

    /// Consume the current nonce.
    pub fn increment(&mut self) {
        let next = self.nonce() + 1;
        debug!(sender = ?self.sender, nonce = %next, "Incremented sender nonce");
        *self.nonce = Some(next);
    }

    /// Replace the nonce with a freshly fetched value.
    pub fn resync(&mut self, fresh: U256) {
        info!(sender = ?self.sender, old = %self.nonce(), new = %fresh, "Resynced sender nonce");
        *self.nonce = Some(fresh);
    }
}
