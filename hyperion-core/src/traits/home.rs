use std::fmt::Debug;
use std::time::SystemTime;

use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::{
    BatchConfirm, BridgeEvent, ChainResult, ExternalCallTx, ExternalDataClaim, HomeTxResponse,
    HyperionId, HyperionParams, LastClaimEvent, OutgoingBatch, SignedDigest, SkippedTx,
    TokenFees, Valset, ValsetConfirm, H160,
};

/// Interface of the home chain used by the orchestration loops.
///
/// Broadcasts are serialized by the implementation; callers may invoke them
/// concurrently.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait HomeChain: Send + Sync + Debug {
    /// Bech32 address of this orchestrator on the home chain.
    fn orchestrator_address(&self) -> String;

    /// Counterparty address derived from the same key.
    fn eth_address(&self) -> H160;

    /// Module parameters, including every counterparty chain.
    async fn params(&self) -> ChainResult<HyperionParams>;

    /// Latest home chain height.
    async fn latest_block_height(&self) -> ChainResult<u64>;

    /// Time of the block at `height`.
    async fn block_time(&self, height: u64) -> ChainResult<SystemTime>;

    /// Last claim event acknowledged for this orchestrator.
    async fn last_claim_event(&self, hyperion_id: HyperionId) -> ChainResult<LastClaimEvent>;

    /// Valsets this orchestrator still has to sign, oldest first.
    async fn oldest_unsigned_valsets(&self, hyperion_id: HyperionId) -> ChainResult<Vec<Valset>>;

    /// Oldest batch this orchestrator still has to sign.
    async fn oldest_unsigned_batch(
        &self,
        hyperion_id: HyperionId,
    ) -> ChainResult<Option<OutgoingBatch>>;

    /// Most recent valsets, newest first.
    async fn latest_valsets(&self, hyperion_id: HyperionId) -> ChainResult<Vec<Valset>>;

    /// Current validator set of the home chain.
    async fn current_valset(&self, hyperion_id: HyperionId) -> ChainResult<Valset>;

    /// Every confirmation of the valset with `nonce`.
    async fn valset_confirms(
        &self,
        hyperion_id: HyperionId,
        nonce: u64,
    ) -> ChainResult<Vec<ValsetConfirm>>;

    /// Outgoing batches waiting to be relayed.
    async fn latest_transaction_batches(
        &self,
        hyperion_id: HyperionId,
    ) -> ChainResult<Vec<OutgoingBatch>>;

    /// Every confirmation of a batch.
    async fn batch_confirms(
        &self,
        hyperion_id: HyperionId,
        nonce: u64,
        token: H160,
    ) -> ChainResult<Vec<BatchConfirm>>;

    /// Tokens with unbatched withdrawals and their summed fees.
    async fn unbatched_tokens_with_fees(
        &self,
        hyperion_id: HyperionId,
    ) -> ChainResult<Vec<TokenFees>>;

    /// Home chain denom of a counterparty token.
    async fn token_to_denom(&self, hyperion_id: HyperionId, token: H160) -> ChainResult<String>;

    /// Pending external call requests.
    async fn external_call_txs(&self, hyperion_id: HyperionId) -> ChainResult<Vec<ExternalCallTx>>;

    /// Block ranges the home chain reports as not claimed.
    async fn skipped_txs(&self, hyperion_id: HyperionId) -> ChainResult<Vec<SkippedTx>>;

    /// Broadcast one claim per event, in the given order, in a single tx.
    async fn send_claims(
        &self,
        hyperion_id: HyperionId,
        events: &[BridgeEvent],
    ) -> ChainResult<HomeTxResponse>;

    /// Dry-run an external data claim.
    async fn simulate_external_data_claim(&self, claim: &ExternalDataClaim) -> ChainResult<()>;

    /// Broadcast external data claims in a single tx.
    async fn send_external_data_claims(
        &self,
        claims: &[ExternalDataClaim],
    ) -> ChainResult<HomeTxResponse>;

    /// Broadcast a valset confirmation.
    async fn send_valset_confirm(
        &self,
        hyperion_id: HyperionId,
        nonce: u64,
        signed: &SignedDigest,
    ) -> ChainResult<HomeTxResponse>;

    /// Broadcast a batch confirmation.
    async fn send_batch_confirm(
        &self,
        hyperion_id: HyperionId,
        batch: &OutgoingBatch,
        signed: &SignedDigest,
    ) -> ChainResult<HomeTxResponse>;

    /// Ask the home chain to form a batch for `denom`.
    async fn request_batch(
        &self,
        hyperion_id: HyperionId,
        denom: &str,
    ) -> ChainResult<HomeTxResponse>;

    /// Forget the cached account sequence.
    async fn reset(&self);
}
