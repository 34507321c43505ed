use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{bail, eyre, Context, Result};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, instrument, warn, Instrument};

use hyperion_base::settings::Settings;
use hyperion_base::{
    AgentMetadata, BaseAgent, ChainSettings, CoreMetrics, DataDir, HttpPriceFeed, Server,
};
use hyperion_core::rpc_clients::PoolConfig;
use hyperion_core::{
    retry_logged, BridgeContract, BridgeLocator, ChainId, ChainResult, CounterpartyChainParams,
    EndpointDiscovery, EthSigner, HomeChain, PriceFeed,
};
use hyperion_ethereum::{
    build_pool, build_provider, ChainlistDiscovery, EthRpcPool, EthereumBridge, EthereumSigner,
    EvmCommitter, NonceCache, PoolTransport, DEFAULT_PENDING_TX_WAIT,
};
use hyperion_helios::HeliosClient;

use crate::admin::AdminApi;
use crate::instance::supervisor::{instance_loops, run_instance};
use crate::instance::{HyperionInstance, InstanceConf, StateSnapshot};
use crate::loops::EndpointUpdater;

struct RunningInstance {
    instance: Arc<HyperionInstance>,
    bridge: Arc<EthereumBridge>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Starts, tracks and stops the orchestrator instances of this process.
/// At most one instance runs per counterparty chain.
pub struct InstanceManager {
    settings: Settings,
    home: Arc<HeliosClient>,
    eth_signer: Arc<EthereumSigner>,
    data_dir: Arc<DataDir>,
    metrics: Arc<CoreMetrics>,
    price_feed: Option<Arc<dyn PriceFeed>>,
    discovery: Arc<dyn EndpointDiscovery>,
    running: Mutex<BTreeMap<ChainId, RunningInstance>>,
    root: CancellationToken,
}

impl Debug for InstanceManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceManager")
            .field("orchestrator", &self.home.address())
            .field("running", &self.running.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl InstanceManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        home: Arc<HeliosClient>,
        eth_signer: Arc<EthereumSigner>,
        data_dir: Arc<DataDir>,
        metrics: Arc<CoreMetrics>,
        price_feed: Option<Arc<dyn PriceFeed>>,
        discovery: Arc<dyn EndpointDiscovery>,
    ) -> Self {
        Self {
            settings,
            home,
            eth_signer,
            data_dir,
            metrics,
            price_feed,
            discovery,
            running: Mutex::new(BTreeMap::new()),
            root: CancellationToken::new(),
        }
    }

    /// Build the shared clients described by `settings`. Nothing here
    /// touches the network.
    pub fn from_settings(settings: Settings, metrics: Arc<CoreMetrics>) -> Result<Self> {
        let home = Arc::new(settings.build_home_client()?);
        let eth_signer = Arc::new(settings.signer.build_eth()?);
        let data_dir = Arc::new(
            DataDir::open(&settings.data_dir)
                .with_context(|| format!("Opening data dir {}", settings.data_dir.display()))?,
        );
        let price_feed = match &settings.price_feed {
            Some(conf) => Some(Arc::new(HttpPriceFeed::new(conf)?) as Arc<dyn PriceFeed>),
            None => {
                info!("No price feed configured, every batch meets the fee threshold");
                None
            }
        };
        let discovery = Arc::new(ChainlistDiscovery::new(settings.chainlist_url.clone()));
        Ok(Self::new(
            settings, home, eth_signer, data_dir, metrics, price_feed, discovery,
        ))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn home(&self) -> &Arc<HeliosClient> {
        &self.home
    }

    pub fn eth_signer(&self) -> &EthereumSigner {
        &self.eth_signer
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data_dir
    }

    pub fn is_running(&self, chain_id: ChainId) -> bool {
        self.running.lock().contains_key(&chain_id)
    }

    /// Home chain parameters of the deployment on `chain_id`.
    pub async fn counterparty_params(&self, chain_id: ChainId) -> Result<CounterpartyChainParams> {
        self.home
            .params()
            .await?
            .for_chain(chain_id)
            .cloned()
            .ok_or_else(|| eyre!("chain {chain_id} is not registered on the home chain"))
    }

    /// Endpoint pool of `chain_id`: configured urls first, then the ones
    /// persisted by the updater, then discovered ones when both are empty.
    async fn connect_pool(&self, chain_id: ChainId) -> Result<EthRpcPool> {
        let configured = self
            .settings
            .chain(chain_id)
            .map(|chain| chain.rpcs.clone())
            .unwrap_or_default();
        let persisted = self.data_dir.rpcs(chain_id);
        let pool = build_pool(chain_id, &configured, &persisted, PoolConfig::default())?;
        if pool.is_empty() {
            self.seed_from_discovery(chain_id, &pool).await?;
        }
        if pool.is_empty() {
            bail!("no reachable rpc endpoint for chain {chain_id}");
        }
        Ok(pool)
    }

    async fn seed_from_discovery(&self, chain_id: ChainId, pool: &EthRpcPool) -> ChainResult<()> {
        for url in self.discovery.discover(chain_id).await? {
            if self.discovery.probe(chain_id, &url).await.is_err() {
                continue;
            }
            if let Ok(provider) = build_provider(&url) {
                if pool.add_endpoint(url.clone(), provider) {
                    pool.mark_tested(&url, true);
                }
            }
        }
        info!(chain_id, endpoints = pool.len(), "Seeded rpc pool from public registry");
        Ok(())
    }

    /// Bridge adapter for `params`, with its own committer.
    async fn connect_bridge(
        &self,
        params: &CounterpartyChainParams,
        chain_settings: &ChainSettings,
    ) -> Result<EthereumBridge> {
        let chain_id = params.bridge_chain_id;
        let pool = self.connect_pool(chain_id).await?;
        let committer = EvmCommitter::new(
            Arc::new(PoolTransport::new(pool.clone())),
            self.eth_signer.wallet().clone(),
            NonceCache::new(),
            chain_settings.gas_config()?,
            chain_id,
        );
        Ok(EthereumBridge::new(
            pool,
            Arc::new(committer),
            params.bridge_contract_address,
            params.locator(),
            DEFAULT_PENDING_TX_WAIT,
        ))
    }

    /// The bridge of `chain_id`, shared with its instance when one runs.
    pub async fn bridge(&self, chain_id: ChainId) -> Result<Arc<EthereumBridge>> {
        if let Some(running) = self.running.lock().get(&chain_id) {
            return Ok(running.bridge.clone());
        }
        let params = self.counterparty_params(chain_id).await?;
        let chain_settings = self.data_dir.chain_settings(chain_id)?;
        Ok(Arc::new(self.connect_bridge(&params, &chain_settings).await?))
    }

    /// Start the instance of `chain_id` and mark it for restart on boot.
    #[instrument(skip(self))]
    pub async fn start(&self, chain_id: ChainId) -> Result<BridgeLocator> {
        if self.is_running(chain_id) {
            bail!("hyperion instance for chain {chain_id} is already running");
        }
        let params = self.counterparty_params(chain_id).await?;
        let chain_settings = self.data_dir.chain_settings(chain_id)?;
        let conf = InstanceConf::build(&params, self.settings.chain(chain_id), &chain_settings)?;
        let bridge = Arc::new(self.connect_bridge(&params, &chain_settings).await?);

        let cancel = self.root.child_token();
        let instance = Arc::new(
            HyperionInstance::new(
                params,
                conf,
                self.home.clone(),
                bridge.clone(),
                self.eth_signer.clone(),
                self.price_feed.clone(),
                self.data_dir.clone(),
                self.metrics.clone(),
            )
            .with_cancel(cancel.clone()),
        );
        let updater = EndpointUpdater::new(
            chain_id,
            bridge.pool().clone(),
            self.discovery.clone(),
            self.data_dir.clone(),
            self.metrics.clone(),
            instance.conf().updater_loop_duration,
        );
        let loops = instance_loops(&instance, Some(updater));
        let locator = instance.locator();

        {
            let mut running = self.running.lock();
            if running.contains_key(&chain_id) {
                bail!("hyperion instance for chain {chain_id} is already running");
            }
            let span = info_span!("hyperion", hyperion_id = locator.hyperion_id, chain_id);
            let handle = tokio::spawn(
                {
                    let instance = instance.clone();
                    let cancel = cancel.clone();
                    async move {
                        if let Err(err) = run_instance(instance, loops, cancel).await {
                            error!(?err, "Orchestrator instance failed");
                        }
                    }
                }
                .instrument(span),
            );
            running.insert(
                chain_id,
                RunningInstance {
                    instance,
                    bridge,
                    cancel,
                    handle,
                },
            );
            self.metrics.running_instances().set(running.len() as i64);
        }

        if let Err(err) = self.data_dir.add_runner(chain_id) {
            warn!(?err, "Could not write the boot marker");
        }
        info!(%locator, "Started orchestrator instance");
        Ok(locator)
    }

    /// Stop the instance of `chain_id` and drop its boot marker. Returns
    /// false when no instance runs for that chain.
    #[instrument(skip(self))]
    pub async fn stop(&self, chain_id: ChainId) -> Result<bool> {
        let Some(running) = self.remove(chain_id) else {
            return Ok(false);
        };
        shut_down(running).await;
        self.data_dir.remove_runner(chain_id)?;
        Ok(true)
    }

    fn remove(&self, chain_id: ChainId) -> Option<RunningInstance> {
        let mut running = self.running.lock();
        let removed = running.remove(&chain_id);
        self.metrics.running_instances().set(running.len() as i64);
        removed
    }

    /// Stop every instance, keeping their boot markers.
    pub async fn stop_all(&self) {
        self.root.cancel();
        let drained: Vec<_> = {
            let mut running = self.running.lock();
            std::mem::take(&mut *running).into_values().collect()
        };
        self.metrics.running_instances().set(0);
        futures_util::future::join_all(drained.into_iter().map(shut_down)).await;
    }

    /// State of every running instance, by chain id.
    pub fn stats(&self) -> Vec<StateSnapshot> {
        self.running
            .lock()
            .values()
            .map(|running| running.instance.state().snapshot())
            .collect()
    }

    /// Endpoints of the running instance of `chain_id`, or the persisted
    /// ones when it is not running.
    pub fn rpcs(&self, chain_id: ChainId) -> Vec<hyperion_core::rpc_clients::EndpointInfo> {
        match self.running.lock().get(&chain_id) {
            Some(running) => running.bridge.pool().endpoints(),
            None => self.data_dir.rpcs(chain_id),
        }
    }

    /// Chains to start at process start: the ones with a boot marker and
    /// the ones configured with `auto_start`.
    pub fn boot_chains(&self) -> Result<BTreeSet<ChainId>> {
        let mut chains: BTreeSet<_> = self.data_dir.runners()?.into_iter().collect();
        chains.extend(
            self.settings
                .chains
                .values()
                .filter(|chain| chain.auto_start)
                .map(|chain| chain.chain_id),
        );
        Ok(chains)
    }

    /// Start every boot chain. A chain that cannot start is logged and
    /// skipped so the others still run.
    pub async fn boot(&self) -> Result<()> {
        for chain_id in self.boot_chains()? {
            if let Err(err) = self.start(chain_id).await {
                error!(chain_id, ?err, "Could not start orchestrator instance on boot");
            }
        }
        Ok(())
    }
}

async fn shut_down(running: RunningInstance) {
    let locator = running.instance.locator();
    running.cancel.cancel();
    if let Err(err) = running.handle.await {
        warn!(%locator, ?err, "Instance task did not end cleanly");
    }
    running.bridge.pool().close();
    info!(%locator, "Stopped orchestrator instance");
}

/// Counterparty chains whose current home valset contains this
/// orchestrator's eth address.
pub async fn operative_chains(home: &dyn HomeChain) -> ChainResult<Vec<CounterpartyChainParams>> {
    let me = home.eth_address();
    let mut operative = Vec::new();
    for params in home.params().await?.counterparty_chain_params {
        let valset = home.current_valset(params.hyperion_id).await?;
        if valset.members.iter().any(|member| member.eth_address == me) {
            operative.push(params);
        }
    }
    Ok(operative)
}

/// The orchestrator agent: one instance per started counterparty chain
/// behind the admin API.
#[derive(Debug)]
pub struct Orchestrator {
    manager: Arc<InstanceManager>,
    server: Arc<Server>,
}

#[async_trait]
impl BaseAgent for Orchestrator {
    const AGENT_NAME: &'static str = "orchestrator";

    type Settings = Settings;

    async fn from_settings(
        agent_metadata: AgentMetadata,
        settings: Self::Settings,
        metrics: Arc<CoreMetrics>,
    ) -> Result<Self>
    where
        Self: Sized,
    {
        let server = Arc::new(Server::new(
            settings.server.port,
            metrics.clone(),
            agent_metadata,
        ));
        let manager = Arc::new(InstanceManager::from_settings(settings, metrics)?);
        Ok(Self { manager, server })
    }

    async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let manager = self.manager;
        let height = retry_logged(&shutdown, "latest_block_height", || {
            manager.home().latest_block_height()
        })
        .await
        .context("Home chain unreachable")?;
        info!(
            orchestrator = %manager.home().address(),
            eth_address = ?manager.eth_signer().eth_address(),
            height,
            "Connected to home chain"
        );

        let router = AdminApi::new(manager.clone()).router();
        let server_task = self
            .server
            .clone()
            .run_with_custom_router(router, shutdown.clone());

        manager.boot().await?;
        shutdown.cancelled().await;

        manager.stop_all().await;
        if let Err(err) = server_task.await {
            warn!(?err, "Admin server task panicked");
        }
        Ok(())
    }
}
