use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cosmrs::proto::cosmos::auth::v1beta1::{BaseAccount, QueryAccountRequest, QueryAccountResponse};
use cosmrs::proto::cosmos::tx::v1beta1::{SimulateRequest, SimulateResponse};
use cosmrs::Any;
use prost::Message;
use tendermint::block::Height;
use tendermint_rpc::client::CompatMode;
use tendermint_rpc::endpoint::broadcast::tx_sync;
use tendermint_rpc::{Client, HttpClient, HttpClientUrl};
use tracing::debug;

use hyperion_core::rpc_clients::{PoolConfig, RpcPool, RpcPoolBuilder};
use hyperion_core::{ChainCommunicationError, ChainResult};

use crate::proto::EthAccount;
use crate::{ConnectionConf, HeliosError};

/// Pool of home chain endpoints.
pub type HeliosRpcPool = RpcPool<HttpClient>;

/// Build a tendermint RPC client for a single endpoint.
pub fn build_http_client(url: &str) -> Result<HttpClient, HeliosError> {
    let url = url.parse::<tendermint_rpc::Url>()?;
    let url = HttpClientUrl::try_from(url)?;
    let client = HttpClient::builder(url)
        .compat_mode(CompatMode::latest())
        .build()?;
    Ok(client)
}

fn rpc_err(err: tendermint_rpc::Error) -> ChainCommunicationError {
    HeliosError::from(err).into()
}

/// Read side of the home chain: ABCI queries, blocks, simulation and raw
/// broadcast, all through the endpoint pool.
#[derive(Debug, Clone)]
pub struct HeliosProvider {
    pool: HeliosRpcPool,
}

impl HeliosProvider {
    /// Build the pool from the configured endpoints.
    pub fn new(conf: &ConnectionConf) -> ChainResult<Self> {
        let config = PoolConfig {
            attempt_timeout: conf.timeout(),
            ..Default::default()
        };
        let mut builder = RpcPoolBuilder::new(format!("home-{}", conf.chain_id())).with_config(config);
        for url in conf.rpc_urls() {
            builder = builder.add_primary(url.clone(), build_http_client(url)?);
        }
        let pool = builder.build();
        if pool.is_empty() {
            return Err(ChainCommunicationError::NoClients);
        }
        Ok(Self { pool })
    }

    /// The endpoint pool.
    pub fn pool(&self) -> &HeliosRpcPool {
        &self.pool
    }

    pub(crate) async fn abci_query<T, R>(&self, path: &str, request: T) -> ChainResult<R>
    where
        T: Message,
        R: Message + Default,
    {
        let bytes = request.encode_to_vec();
        let response = self
            .pool
            .call_rpc(|client| {
                let bytes = bytes.clone();
                let path = path.to_owned();
                Box::pin(async move {
                    client
                        .abci_query(Some(path), bytes, None, false)
                        .await
                        .map_err(rpc_err)
                })
            })
            .await?;

        if response.code.is_err() {
            return Err(HeliosError::QueryFailed {
                path: path.to_owned(),
                code: response.code.value(),
                log: response.log,
            }
            .into());
        }

        let response = R::decode(response.value.as_slice()).map_err(HeliosError::from)?;
        Ok(response)
    }

    /// Height of the latest block.
    pub async fn latest_height(&self) -> ChainResult<u64> {
        self.pool
            .call_rpc(|client| {
                Box::pin(async move {
                    let block = client.latest_block().await.map_err(rpc_err)?;
                    Ok(block.block.header.height.value())
                })
            })
            .await
    }

    /// Header time of the block at `height`.
    pub async fn block_time(&self, height: u64) -> ChainResult<SystemTime> {
        let height = Height::try_from(height).map_err(HeliosError::from)?;
        let nanos = self
            .pool
            .call_rpc(|client| {
                Box::pin(async move {
                    let block = client.block(height).await.map_err(rpc_err)?;
                    Ok(block.block.header.time.unix_timestamp_nanos())
                })
            })
            .await?;
        let nanos = u64::try_from(nanos).map_err(|_| {
            ChainCommunicationError::ParseError(format!("block time {nanos} before epoch"))
        })?;
        Ok(UNIX_EPOCH + Duration::from_nanos(nanos))
    }

    /// Account number and sequence of `address`.
    pub async fn account(&self, address: String) -> ChainResult<BaseAccount> {
        let response: QueryAccountResponse = self
            .abci_query(
                "/cosmos.auth.v1beta1.Query/Account",
                QueryAccountRequest { address },
            )
            .await?;
        let account = response
            .account
            .ok_or(HeliosError::MissingField("account"))?;
        Ok(decode_account(&account)?)
    }

    /// Gas used by a simulated transaction.
    pub async fn simulate(&self, tx_bytes: Vec<u8>) -> ChainResult<u64> {
        #[allow(deprecated)]
        let response: SimulateResponse = self
            .abci_query(
                "/cosmos.tx.v1beta1.Service/Simulate",
                SimulateRequest { tx_bytes, tx: None },
            )
            .await?;
        let gas_used = response
            .gas_info
            .ok_or(HeliosError::MissingField("gas_info"))?
            .gas_used;
        debug!(gas_used, "Simulated home chain tx");
        Ok(gas_used)
    }

    /// Broadcast signed tx bytes, returning once CheckTx ran.
    pub async fn broadcast_sync(&self, tx_bytes: Vec<u8>) -> ChainResult<tx_sync::Response> {
        self.pool
            .call_rpc(|client| {
                let tx_bytes = tx_bytes.clone();
                Box::pin(async move { client.broadcast_tx_sync(tx_bytes).await.map_err(rpc_err) })
            })
            .await
    }
}

/// Decode either a plain base account or an ethermint account wrapping one.
pub(crate) fn decode_account(account: &Any) -> Result<BaseAccount, HeliosError> {
    if account.type_url.ends_with("EthAccount") {
        return EthAccount::decode(account.value.as_slice())?
            .base_account
            .ok_or(HeliosError::MissingField("base_account"));
    }
    Ok(BaseAccount::decode(account.value.as_slice())?)
}
