use std::fmt::Debug;

use async_trait::async_trait;
use auto_impl::auto_impl;
use serde::{Deserialize, Serialize};

use crate::{
    BatchConfirm, BridgeEvents, BridgeLocator, CallOutcome, ChainResult, HyperionId,
    OutgoingBatch, TxOutcome, Valset, ValsetConfirm, ValsetUpdatedEvent, H160, H256, U256,
};

/// Outcome of `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitOutcome {
    /// The call went through in this transaction
    Initialized(TxOutcome),
    /// The contract was already initialized at the given block
    AlreadyInitialized {
        /// Block recovered from `state_lastEventHeight`
        init_block: u64,
    },
}

/// Typed access to the bridge contract deployed on a counterparty chain.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait BridgeContract: Send + Sync + Debug {
    /// The deployment this contract serves.
    fn locator(&self) -> BridgeLocator;

    /// Address of the bridge contract.
    fn address(&self) -> H160;

    /// Address transactions are sent from.
    fn sender(&self) -> H160;

    /// Move reads to another endpoint after one served stale state.
    fn rotate_endpoint(&self);

    /// Latest counterparty block number.
    async fn latest_block(&self) -> ChainResult<u64>;

    /// `state_lastValsetNonce`
    async fn state_last_valset_nonce(&self) -> ChainResult<u64>;

    /// `state_lastValsetCheckpoint`
    async fn state_last_valset_checkpoint(&self) -> ChainResult<H256>;

    /// `state_lastEventNonce`
    async fn state_last_event_nonce(&self) -> ChainResult<u64>;

    /// `state_lastValsetHeight`
    async fn state_last_valset_height(&self) -> ChainResult<u64>;

    /// `state_lastEventHeight`
    async fn state_last_event_height(&self) -> ChainResult<u64>;

    /// `lastBatchNonce(token)`
    async fn last_batch_nonce(&self, token: H160) -> ChainResult<u64>;

    /// `state_hyperionId`
    async fn state_hyperion_id(&self) -> ChainResult<H256>;

    /// ERC20 `decimals()` through a raw call.
    async fn token_decimals(&self, token: H160) -> ChainResult<u8>;

    /// ERC20 `symbol()`.
    async fn token_symbol(&self, token: H160) -> ChainResult<String>;

    /// All four contract event kinds in `[start, end]`.
    async fn filter_events(&self, start: u64, end: u64) -> ChainResult<BridgeEvents>;

    /// `ValsetUpdatedEvent`s in `[start, end]`.
    async fn filter_valset_updated(&self, start: u64, end: u64)
        -> ChainResult<Vec<ValsetUpdatedEvent>>;

    /// Relay a confirmed batch.
    async fn submit_batch(
        &self,
        current_valset: &Valset,
        batch: &OutgoingBatch,
        confirms: &[BatchConfirm],
    ) -> ChainResult<TxOutcome>;

    /// Move the contract to `new_valset`.
    async fn update_valset(
        &self,
        old_valset: &Valset,
        new_valset: &Valset,
        confirms: &[ValsetConfirm],
    ) -> ChainResult<TxOutcome>;

    /// Deposit `amount` of `erc20` for `recipient` on the home chain.
    async fn send_to_home(
        &self,
        erc20: H160,
        amount: U256,
        recipient: &[u8],
    ) -> ChainResult<TxOutcome>;

    /// Deploy a token representing a home chain denom.
    async fn deploy_erc20(
        &self,
        denom: &str,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> ChainResult<TxOutcome>;

    /// One-shot contract initialization.
    async fn initialize(
        &self,
        hyperion_id: HyperionId,
        power_threshold: u64,
        valset: &Valset,
    ) -> ChainResult<InitOutcome>;

    /// Pause the bridge.
    async fn emergency_pause(&self) -> ChainResult<TxOutcome>;

    /// Unpause the bridge.
    async fn emergency_unpause(&self) -> ChainResult<TxOutcome>;

    /// Whether the bridge is paused.
    async fn paused(&self) -> ChainResult<bool>;

    /// Read-only call against an arbitrary contract at `block`.
    async fn call_at(&self, to: H160, data: Vec<u8>, block: u64) -> ChainResult<CallOutcome>;
}
