use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::AbiEncode;
use ethers::providers::Middleware;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, Bytes, TransactionRequest, H256, U256};
use futures_util::try_join;
use tracing::{info, instrument, warn};

use hyperion_core::encode::hyperion_id_bytes32;
use hyperion_core::rpc_clients::Selection;
use hyperion_core::utils::bytes_to_h256;
use hyperion_core::{
    repack_signatures, BatchConfirm, BridgeContract, BridgeEvents, BridgeLocator, CallOutcome,
    ChainCommunicationError, ChainResult, HyperionId, InitOutcome, OutgoingBatch, TxOutcome,
    Valset, ValsetConfirm, ValsetUpdatedEvent,
};

use crate::contracts::{
    ApproveCall, DeployERC20Call, EmergencyPauseCall, EmergencyUnpauseCall, Erc20,
    Erc20DeployedEventFilter, HyperionBridgeInternal, InitializeCall, SendToCosmosCall,
    SendToHeliosEventFilter, SubmitBatchCall, TransactionBatchExecutedEventFilter,
    UpdateValsetCall, ValsetArgs, ValsetUpdatedEventFilter, DECIMALS_SELECTOR,
};
use crate::error::{contract_err, provider_err};
use crate::events::{
    query_events, to_batch_executed, to_erc20_deployed, to_send_to_home, to_valset_updated,
};
use crate::{
    classify_commit_error, provider, CommitErrorClass, EthRpcPool, EvmCommitter, PendingInputs,
};

/// How long an identical `submitBatch`/`updateValset` input blocks a resend.
pub const DEFAULT_PENDING_TX_WAIT: Duration = Duration::from_secs(20 * 60);

fn valset_args(valset: &Valset) -> ValsetArgs {
    ValsetArgs {
        validators: valset.validators(),
        powers: valset.powers(),
        valset_nonce: valset.nonce.into(),
        reward_amount: valset.reward_amount,
        reward_token: valset.reward_token,
    }
}

/// The bridge contract on one counterparty chain. Built once per instance and
/// shared by every loop.
#[derive(Debug, Clone)]
pub struct EthereumBridge {
    pool: EthRpcPool,
    committer: Arc<EvmCommitter>,
    address: Address,
    locator: BridgeLocator,
    pending: PendingInputs,
}

impl EthereumBridge {
    /// Create an adapter for the contract at `address`.
    pub fn new(
        pool: EthRpcPool,
        committer: Arc<EvmCommitter>,
        address: Address,
        locator: BridgeLocator,
        pending_tx_wait: Duration,
    ) -> Self {
        Self {
            pool,
            committer,
            address,
            locator,
            pending: PendingInputs::new(pending_tx_wait),
        }
    }

    /// The endpoint pool this adapter reads through.
    pub fn pool(&self) -> &EthRpcPool {
        &self.pool
    }

    /// The committer all writes go through.
    pub fn committer(&self) -> &EvmCommitter {
        &self.committer
    }

    async fn send_deduplicated(&self, data: Vec<u8>) -> ChainResult<TxOutcome> {
        let key = self.pending.check_and_insert(&data)?;
        self.pending.prune();
        let result = self.committer.send_tx(self.address, Bytes::from(data)).await;
        if let Err(err) = &result {
            // a known transaction is already in the mempool and keeps blocking resends
            if classify_commit_error(&err.to_string()) != CommitErrorClass::KnownTransaction {
                self.pending.remove(&key);
            }
        }
        result
    }

    async fn raw_call(&self, to: Address, data: Vec<u8>) -> ChainResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.pool
            .call_eth(|provider| {
                let tx = tx.clone();
                Box::pin(async move { provider.call(&tx, None).await.map_err(provider_err) })
            })
            .await
    }
}

/// Read a view through the pool, creating the binding against whichever
/// endpoint was selected.
macro_rules! view {
    ($self:ident, $contract:ident, $address:expr, |$c:ident| $call:expr) => {{
        let address = $address;
        $self
            .pool
            .call_eth(|provider| {
                Box::pin(async move {
                    let $c = $contract::new(address, provider);
                    $call.call().await.map_err(contract_err)
                })
            })
            .await
    }};
}

#[async_trait]
impl BridgeContract for EthereumBridge {
    fn locator(&self) -> BridgeLocator {
        self.locator
    }

    fn address(&self) -> Address {
        self.address
    }

    fn sender(&self) -> Address {
        self.committer.sender()
    }

    fn rotate_endpoint(&self) {
        self.pool.rotate();
    }

    async fn latest_block(&self) -> ChainResult<u64> {
        provider::latest_block(&self.pool).await
    }

    async fn state_last_valset_nonce(&self) -> ChainResult<u64> {
        let nonce: U256 = view!(self, HyperionBridgeInternal, self.address, |c| c
            .state_last_valset_nonce())?;
        Ok(nonce.low_u64())
    }

    async fn state_last_valset_checkpoint(&self) -> ChainResult<H256> {
        let checkpoint: [u8; 32] = view!(self, HyperionBridgeInternal, self.address, |c| c
            .state_last_valset_checkpoint())?;
        Ok(H256(checkpoint))
    }

    async fn state_last_event_nonce(&self) -> ChainResult<u64> {
        let nonce: U256 = view!(self, HyperionBridgeInternal, self.address, |c| c
            .state_last_event_nonce())?;
        Ok(nonce.low_u64())
    }

    async fn state_last_valset_height(&self) -> ChainResult<u64> {
        let height: U256 = view!(self, HyperionBridgeInternal, self.address, |c| c
            .state_last_valset_height())?;
        Ok(height.low_u64())
    }

    async fn state_last_event_height(&self) -> ChainResult<u64> {
        let height: U256 = view!(self, HyperionBridgeInternal, self.address, |c| c
            .state_last_event_height())?;
        Ok(height.low_u64())
    }

    async fn last_batch_nonce(&self, token: Address) -> ChainResult<u64> {
        let nonce: U256 = view!(self, HyperionBridgeInternal, self.address, |c| c
            .last_batch_nonce(token))?;
        Ok(nonce.low_u64())
    }

    async fn state_hyperion_id(&self) -> ChainResult<H256> {
        let id: [u8; 32] =
            view!(self, HyperionBridgeInternal, self.address, |c| c.state_hyperion_id())?;
        Ok(H256(id))
    }

    async fn token_decimals(&self, token: Address) -> ChainResult<u8> {
        let raw = self.raw_call(token, DECIMALS_SELECTOR.to_vec()).await?;
        if raw.len() < 32 {
            return Err(ChainCommunicationError::ParseError(format!(
                "decimals() of {token:?} returned {} bytes",
                raw.len()
            )));
        }
        let decimals = U256::from_big_endian(&raw[..32]);
        if decimals > U256::from(u8::MAX) {
            return Err(ChainCommunicationError::ParseError(format!(
                "decimals() of {token:?} out of range: {decimals}"
            )));
        }
        Ok(decimals.low_u32() as u8)
    }

    async fn token_symbol(&self, token: Address) -> ChainResult<String> {
        view!(self, Erc20, token, |c| c.symbol())
    }

    #[instrument(skip(self), fields(locator = %self.locator))]
    async fn filter_events(&self, start: u64, end: u64) -> ChainResult<BridgeEvents> {
        let (deposits, withdrawals, valsets, erc20_deployments) = try_join!(
            query_events::<SendToHeliosEventFilter>(&self.pool, self.address, start, end),
            query_events::<TransactionBatchExecutedEventFilter>(
                &self.pool,
                self.address,
                start,
                end
            ),
            query_events::<ValsetUpdatedEventFilter>(&self.pool, self.address, start, end),
            query_events::<Erc20DeployedEventFilter>(&self.pool, self.address, start, end),
        )?;
        Ok(BridgeEvents {
            deposits: deposits.into_iter().map(to_send_to_home).collect(),
            withdrawals: withdrawals.into_iter().map(to_batch_executed).collect(),
            valsets: valsets.into_iter().map(to_valset_updated).collect(),
            erc20_deployments: erc20_deployments.into_iter().map(to_erc20_deployed).collect(),
        })
    }

    async fn filter_valset_updated(
        &self,
        start: u64,
        end: u64,
    ) -> ChainResult<Vec<ValsetUpdatedEvent>> {
        let events =
            query_events::<ValsetUpdatedEventFilter>(&self.pool, self.address, start, end).await?;
        Ok(events.into_iter().map(to_valset_updated).collect())
    }

    #[instrument(skip_all, fields(locator = %self.locator, batch_nonce = batch.batch_nonce, token = ?batch.token_contract))]
    async fn submit_batch(
        &self,
        current_valset: &Valset,
        batch: &OutgoingBatch,
        confirms: &[BatchConfirm],
    ) -> ChainResult<TxOutcome> {
        let signatures = repack_signatures(current_valset, confirms)?;
        let call = SubmitBatchCall {
            current_valset: valset_args(current_valset),
            v: signatures.v(),
            r: signatures.r(),
            s: signatures.s(),
            amounts: batch.amounts(),
            destinations: batch.destinations(),
            fees: batch.fees(),
            batch_nonce: batch.batch_nonce.into(),
            token_contract: batch.token_contract,
            batch_timeout: batch.batch_timeout.into(),
        };
        let outcome = self.send_deduplicated(call.encode()).await?;
        info!(tx_hash = ?outcome.tx_hash, good_power = signatures.good_power, "Submitted batch");
        Ok(outcome)
    }

    #[instrument(skip_all, fields(locator = %self.locator, old = old_valset.nonce, new = new_valset.nonce))]
    async fn update_valset(
        &self,
        old_valset: &Valset,
        new_valset: &Valset,
        confirms: &[ValsetConfirm],
    ) -> ChainResult<TxOutcome> {
        if new_valset.nonce <= old_valset.nonce {
            return Err(ChainCommunicationError::ValsetNonceNotIncreasing {
                old: old_valset.nonce,
                new: new_valset.nonce,
            });
        }
        let signatures = repack_signatures(old_valset, confirms)?;
        let call = UpdateValsetCall {
            new_valset: valset_args(new_valset),
            current_valset: valset_args(old_valset),
            v: signatures.v(),
            r: signatures.r(),
            s: signatures.s(),
        };
        let outcome = self.send_deduplicated(call.encode()).await?;
        info!(tx_hash = ?outcome.tx_hash, good_power = signatures.good_power, "Updated valset");
        Ok(outcome)
    }

    #[instrument(skip(self, recipient), fields(locator = %self.locator))]
    async fn send_to_home(
        &self,
        erc20: Address,
        amount: U256,
        recipient: &[u8],
    ) -> ChainResult<TxOutcome> {
        let owner = self.committer.sender();
        let bridge = self.address;
        let allowance: U256 = view!(self, Erc20, erc20, |c| c.allowance(owner, bridge))?;
        if allowance != U256::MAX {
            info!(?erc20, %allowance, "Approving bridge to spend token");
            let approve = ApproveCall {
                spender: bridge,
                amount: U256::MAX,
            };
            self.committer
                .send_tx(erc20, Bytes::from(approve.encode()))
                .await?;
        }

        let call = SendToCosmosCall {
            token_contract: erc20,
            destination: bytes_to_h256(recipient)?.0,
            amount,
        };
        self.committer
            .send_tx(self.address, Bytes::from(call.encode()))
            .await
    }

    #[instrument(skip(self), fields(locator = %self.locator))]
    async fn deploy_erc20(
        &self,
        denom: &str,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> ChainResult<TxOutcome> {
        let call = DeployERC20Call {
            cosmos_denom: denom.to_owned(),
            name: name.to_owned(),
            symbol: symbol.to_owned(),
            decimals,
        };
        self.committer
            .send_tx(self.address, Bytes::from(call.encode()))
            .await
    }

    #[instrument(skip(self, valset), fields(locator = %self.locator, members = valset.members.len()))]
    async fn initialize(
        &self,
        hyperion_id: HyperionId,
        power_threshold: u64,
        valset: &Valset,
    ) -> ChainResult<InitOutcome> {
        let call = InitializeCall {
            hyperion_id: hyperion_id_bytes32(hyperion_id),
            power_threshold: power_threshold.into(),
            validators: valset.validators(),
            powers: valset.powers(),
        };
        match self
            .committer
            .send_tx(self.address, Bytes::from(call.encode()))
            .await
        {
            Ok(outcome) => Ok(InitOutcome::Initialized(outcome)),
            Err(error) => {
                if self.state_last_event_nonce().await? != 1 {
                    return Err(error);
                }
                let init_block = self.state_last_event_height().await?;
                warn!(?error, init_block, "Bridge contract already initialized");
                Ok(InitOutcome::AlreadyInitialized { init_block })
            }
        }
    }

    async fn emergency_pause(&self) -> ChainResult<TxOutcome> {
        self.committer
            .send_tx(self.address, Bytes::from(EmergencyPauseCall.encode()))
            .await
    }

    async fn emergency_unpause(&self) -> ChainResult<TxOutcome> {
        self.committer
            .send_tx(self.address, Bytes::from(EmergencyUnpauseCall.encode()))
            .await
    }

    async fn paused(&self) -> ChainResult<bool> {
        view!(self, HyperionBridgeInternal, self.address, |c| c.paused())
    }

    async fn call_at(&self, to: Address, data: Vec<u8>, block: u64) -> ChainResult<CallOutcome> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        let block = BlockId::Number(block.into());
        let (result, rpc_used) = self
            .pool
            .call_with(Selection::Random, |provider| {
                let tx = tx.clone();
                Box::pin(async move {
                    match provider.call(&tx, Some(block)).await {
                        Ok(data) => Ok(Ok(data)),
                        // a revert is an answer, not an endpoint failure
                        Err(error) if error.to_string().to_lowercase().contains("revert") => {
                            Ok(Err(error.to_string()))
                        }
                        Err(error) => Err(provider_err(error)),
                    }
                })
            })
            .await?;
        Ok(match result {
            Ok(data) => CallOutcome {
                data: data.to_vec(),
                error: String::new(),
                rpc_used,
            },
            Err(error) => CallOutcome {
                data: vec![],
                error,
                rpc_used,
            },
        })
    }
}
