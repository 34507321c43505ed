use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Http, Middleware, Provider};
use tracing::{debug, warn};
use url::Url;

use hyperion_core::rpc_clients::{EndpointInfo, PoolConfig, RpcPool, RpcPoolBuilder};
use hyperion_core::{ChainId, ChainResult};

use crate::error::{provider_err, HyperionEthereumError};

/// Provider type every pool endpoint wraps.
pub type EthProvider = Arc<Provider<Http>>;

/// Pool of counterparty chain endpoints.
pub type EthRpcPool = RpcPool<EthProvider>;

/// Polling interval for pending transactions.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Build an ethers provider for a single endpoint.
pub fn build_provider(url: &str) -> Result<EthProvider, HyperionEthereumError> {
    let parsed: Url = url.parse().map_err(|source| HyperionEthereumError::InvalidUrl {
        url: url.to_owned(),
        source,
    })?;
    let provider = Provider::new(Http::new(parsed)).interval(POLL_INTERVAL);
    Ok(Arc::new(provider))
}

/// Build the pool for `chain_id`. Configured URLs come first and are marked
/// primary; persisted endpoints are appended and get their reputation back.
pub fn build_pool(
    chain_id: ChainId,
    configured: &[String],
    persisted: &[EndpointInfo],
    config: PoolConfig,
) -> ChainResult<EthRpcPool> {
    let mut builder = RpcPoolBuilder::new(format!("evm-{chain_id}")).with_config(config);
    for url in configured {
        builder = builder.add_primary(url.clone(), build_provider(url)?);
    }
    for info in persisted {
        if configured.contains(&info.url) {
            continue;
        }
        match build_provider(&info.url) {
            Ok(provider) => builder = builder.add_secondary(info.url.clone(), provider),
            Err(error) => warn!(url = %info.url, ?error, "Skipping persisted endpoint"),
        }
    }
    let pool = builder.build();
    for info in persisted {
        pool.restore(info);
    }
    debug!(chain_id, endpoints = pool.len(), "Built counterparty rpc pool");
    Ok(pool)
}

/// Latest block number through the pool.
pub async fn latest_block(pool: &EthRpcPool) -> ChainResult<u64> {
    pool.call_eth(|provider| {
        Box::pin(async move {
            provider
                .get_block_number()
                .await
                .map(|n| n.as_u64())
                .map_err(provider_err)
        })
    })
    .await
}

/// Chain id reported by an endpoint.
pub async fn chain_id(provider: &EthProvider) -> ChainResult<u64> {
    provider
        .get_chainid()
        .await
        .map(|id| id.as_u64())
        .map_err(provider_err)
}
