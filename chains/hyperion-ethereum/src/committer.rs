use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use derive_new::new;
use ethers::providers::Middleware;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, TransactionRequest, H256, U256};
use tracing::{info, instrument, warn};

use hyperion_core::{ChainCommunicationError, ChainResult, TxOutcome};

use crate::error::provider_err;
use crate::{EthRpcPool, GasConfig, HyperionEthereumError, NonceCache};

/// Deadline for re-reading the pending nonce after a mismatch.
pub const NONCE_RESYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// The node calls the committer needs. Implemented over the rpc pool in
/// production and mocked in tests.
#[async_trait]
pub trait TxTransport: Send + Sync + Debug {
    /// `eth_gasPrice`
    async fn gas_price(&self) -> ChainResult<U256>;

    /// `eth_estimateGas`
    async fn estimate_gas(&self, tx: &TypedTransaction) -> ChainResult<U256>;

    /// `eth_getTransactionCount(address, "pending")`
    async fn pending_nonce(&self, address: Address) -> ChainResult<U256>;

    /// `eth_sendRawTransaction`
    async fn send_raw_transaction(&self, raw: Bytes) -> ChainResult<H256>;
}

/// `TxTransport` over a counterparty rpc pool.
#[derive(Debug, Clone, new)]
pub struct PoolTransport {
    pool: EthRpcPool,
}

#[async_trait]
impl TxTransport for PoolTransport {
    async fn gas_price(&self) -> ChainResult<U256> {
        self.pool
            .call_eth(|provider| {
                Box::pin(async move { provider.get_gas_price().await.map_err(provider_err) })
            })
            .await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> ChainResult<U256> {
        self.pool
            .call_eth(|provider| {
                let tx = tx.clone();
                Box::pin(async move { provider.estimate_gas(&tx, None).await.map_err(provider_err) })
            })
            .await
    }

    async fn pending_nonce(&self, address: Address) -> ChainResult<U256> {
        self.pool
            .call_eth(|provider| {
                Box::pin(async move {
                    provider
                        .get_transaction_count(address, Some(BlockNumber::Pending.into()))
                        .await
                        .map_err(provider_err)
                })
            })
            .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ChainResult<H256> {
        self.pool
            .call_rpc(|provider| {
                let raw = raw.clone();
                Box::pin(async move {
                    let pending = provider
                        .send_raw_transaction(raw)
                        .await
                        .map_err(provider_err)?;
                    Ok(pending.tx_hash())
                })
            })
            .await
    }
}

/// How the committer reacts to a failed broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitErrorClass {
    /// The node rejected the signer; the nonce is consumed
    InvalidSender,
    /// The cached nonce is wrong; resync and retry once
    NonceMismatch,
    /// The transaction is already in the mempool
    KnownTransaction,
    /// The EVM reverted; the nonce is consumed
    VmException,
    /// The sender can not pay for gas
    InsufficientFunds,
    /// Anything else
    Other,
}

/// Classify a broadcast error by the node message.
pub fn classify_commit_error(message: &str) -> CommitErrorClass {
    let message = message.to_lowercase();
    if message.contains("invalid sender") {
        CommitErrorClass::InvalidSender
    } else if message.contains("nonce too low")
        || message.contains("nonce too high")
        || message.contains("doesn't have the correct nonce")
    {
        CommitErrorClass::NonceMismatch
    } else if message.contains("known transaction") || message.contains("already known") {
        CommitErrorClass::KnownTransaction
    } else if message.contains("vm exception") {
        CommitErrorClass::VmException
    } else if message.contains("insufficient funds") {
        CommitErrorClass::InsufficientFunds
    } else {
        CommitErrorClass::Other
    }
}

/// The only path that sends state-changing transactions for one sender.
#[derive(Debug, Clone)]
pub struct EvmCommitter {
    transport: Arc<dyn TxTransport>,
    wallet: LocalWallet,
    nonces: NonceCache,
    gas: GasConfig,
    chain_id: u64,
}

impl EvmCommitter {
    /// Create a committer. The wallet is bound to `chain_id`.
    pub fn new(
        transport: Arc<dyn TxTransport>,
        wallet: LocalWallet,
        nonces: NonceCache,
        gas: GasConfig,
        chain_id: u64,
    ) -> Self {
        Self {
            transport,
            wallet: wallet.with_chain_id(chain_id),
            nonces,
            gas,
            chain_id,
        }
    }

    /// Address transactions are sent from.
    pub fn sender(&self) -> Address {
        self.wallet.address()
    }

    /// Gas parameters in use.
    pub fn gas_config(&self) -> &GasConfig {
        &self.gas
    }

    /// The shared nonce cache.
    pub fn nonces(&self) -> &NonceCache {
        &self.nonces
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        let suggested = match self.transport.gas_price().await {
            Ok(price) => price,
            Err(error) => {
                warn!(?error, fallback = %self.gas.fallback_gas_price, "Failed to get suggested gas price");
                self.gas.fallback_gas_price
            }
        };
        self.gas.bounded_gas_price(suggested)
    }

    async fn fresh_nonce(&self, sender: Address) -> ChainResult<U256> {
        match tokio::time::timeout(NONCE_RESYNC_TIMEOUT, self.transport.pending_nonce(sender)).await
        {
            Ok(result) => result,
            Err(_) => Err(ChainCommunicationError::Timeout(NONCE_RESYNC_TIMEOUT)),
        }
    }

    fn sign(&self, tx: &TypedTransaction) -> ChainResult<Bytes> {
        let signature = self
            .wallet
            .sign_transaction_sync(tx)
            .map_err(HyperionEthereumError::from)?;
        Ok(tx.rlp_signed(&signature))
    }

    /// Sign and broadcast a call to `to` with `data`, holding the sender's
    /// nonce for the whole attempt.
    #[instrument(skip_all, fields(sender = ?self.sender(), ?to, chain_id = self.chain_id))]
    pub async fn send_tx(&self, to: Address, data: Bytes) -> ChainResult<TxOutcome> {
        let sender = self.sender();
        let mut nonce = self
            .nonces
            .lock(sender, || self.transport.pending_nonce(sender))
            .await?;

        let gas_price = self.gas_price().await?;
        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(sender)
            .to(to)
            .data(data)
            .gas_price(gas_price)
            .chain_id(self.chain_id)
            .into();
        let gas_limit = if self.gas.estimate_gas {
            self.transport.estimate_gas(&tx).await?
        } else {
            self.gas.gas_limit
        };
        tx.set_gas(gas_limit);
        let gas_cost = gas_price.saturating_mul(gas_limit);

        let mut retried = false;
        loop {
            tx.set_nonce(nonce.nonce());
            let raw = self.sign(&tx)?;
            let error = match self.transport.send_raw_transaction(raw).await {
                Ok(tx_hash) => {
                    info!(?tx_hash, nonce = %nonce.nonce(), %gas_price, %gas_limit, "Dispatched transaction");
                    nonce.increment();
                    return Ok(TxOutcome { tx_hash, gas_cost });
                }
                Err(error) => error,
            };

            let message = error.to_string();
            match classify_commit_error(&message) {
                CommitErrorClass::InvalidSender => {
                    nonce.increment();
                    return Err(ChainCommunicationError::InvalidSender(message));
                }
                CommitErrorClass::VmException => {
                    nonce.increment();
                    return Err(ChainCommunicationError::VmException(message));
                }
                CommitErrorClass::InsufficientFunds => {
                    return Err(ChainCommunicationError::InsufficientFunds(message));
                }
                CommitErrorClass::NonceMismatch if !retried => {
                    warn!(cached = %nonce.nonce(), %message, "Nonce mismatch, resyncing");
                    let fresh = self.fresh_nonce(sender).await?;
                    nonce.resync(fresh);
                    retried = true;
                }
                CommitErrorClass::NonceMismatch => {
                    return Err(ChainCommunicationError::NonceMismatch { sender, message });
                }
                CommitErrorClass::KnownTransaction if !retried => {
                    warn!(nonce = %nonce.nonce(), "Transaction already known, retrying with next nonce");
                    nonce.increment();
                    retried = true;
                }
                CommitErrorClass::KnownTransaction | CommitErrorClass::Other => return Err(error),
            }
        }
    }
}
