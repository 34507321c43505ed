use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use hyperion_base::{CoreMetrics, DataDir};
use hyperion_core::{ChainId, ChainResult, EndpointDiscovery};
use hyperion_ethereum::{build_provider, EthRpcPool};

use crate::instance::{LoopKind, OrchestratorLoop};

/// Grows the endpoint pool of a chain from public registries and persists
/// what the pool learned about each endpoint.
#[derive(Debug)]
pub struct EndpointUpdater {
    chain_id: ChainId,
    pool: EthRpcPool,
    discovery: Arc<dyn EndpointDiscovery>,
    data_dir: Arc<DataDir>,
    metrics: Arc<CoreMetrics>,
    interval: Duration,
}

impl EndpointUpdater {
    pub fn new(
        chain_id: ChainId,
        pool: EthRpcPool,
        discovery: Arc<dyn EndpointDiscovery>,
        data_dir: Arc<DataDir>,
        metrics: Arc<CoreMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            chain_id,
            pool,
            discovery,
            data_dir,
            metrics,
            interval,
        }
    }

    /// Probe the discovered endpoints the pool does not know yet and add
    /// the ones that answer.
    async fn add_discovered(&self) -> ChainResult<usize> {
        let mut added = 0;
        for url in self.discovery.discover(self.chain_id).await? {
            if self.pool.contains(&url) {
                continue;
            }
            match self.discovery.probe(self.chain_id, &url).await {
                Ok(height) => {
                    let provider = match build_provider(&url) {
                        Ok(provider) => provider,
                        Err(err) => {
                            debug!(%url, ?err, "Unusable endpoint url");
                            continue;
                        }
                    };
                    if self.pool.add_endpoint(url.clone(), provider) {
                        self.pool.mark_tested(&url, true);
                        debug!(%url, height, "Added endpoint");
                        added += 1;
                    }
                }
                Err(err) => debug!(%url, ?err, "Endpoint failed probe"),
            }
        }
        Ok(added)
    }

    fn persist(&self) {
        let endpoints = self.pool.endpoints();
        let chain = self.chain_id.to_string();
        for endpoint in &endpoints {
            self.metrics
                .endpoint_reputation()
                .with_label_values(&[chain.as_str(), endpoint.url.as_str()])
                .set(endpoint.reputation as i64);
        }
        if let Err(err) = self.data_dir.save_rpcs(self.chain_id, &endpoints) {
            warn!(?err, "Failed to persist endpoints");
        }
    }
}

#[async_trait]
impl OrchestratorLoop for EndpointUpdater {
    fn kind(&self) -> LoopKind {
        LoopKind::Updater
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    #[instrument(skip(self), fields(chain_id = self.chain_id))]
    async fn tick(&mut self) -> ChainResult<()> {
        let discovered = self.add_discovered().await;
        self.persist();
        let added = discovered?;
        if added > 0 {
            info!(added, endpoints = self.pool.len(), "Extended endpoint pool");
        }
        Ok(())
    }
}
