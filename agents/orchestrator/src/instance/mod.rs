//! One orchestrator instance per counterparty chain.
//!
//! An instance owns the bridge adapter of its chain and shares the home chain
//! client with every other instance of the process. Its loops run under a
//! single supervisor, see [`supervisor::run_instance`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use hyperion_base::{ChainSettings, CoreMetrics, DataDir, FeeKind, FeeRecord};
use hyperion_core::{
    retry, BridgeContract, BridgeLocator, ChainResult, CounterpartyChainParams, EthSigner,
    HomeChain, PriceFeed, RetryPolicy, TxOutcome, H160, U256,
};

pub use state::*;
pub use supervisor::OrchestratorLoop;

pub mod state;
pub mod supervisor;

/// Counterparty blocks an event must be buried under before it is claimed.
pub const DEFAULT_CONFIRMATION_DELAY: u64 = 96;
/// Width of one oracle scan window.
pub const DEFAULT_BLOCKS_TO_SEARCH: u64 = 2_000;
/// How often the oracle rewinds to the last claim acknowledged by the home
/// chain.
pub const DEFAULT_AUTO_RESYNC_INTERVAL: Duration = Duration::from_secs(48 * 60 * 60);
pub const DEFAULT_LOOP_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_VALSET_MANAGER_LOOP_DURATION: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RELAYER_LOOP_DURATION: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_UPDATER_LOOP_DURATION: Duration = Duration::from_secs(20 * 60);
/// External data claims per home chain transaction.
pub const EXTERNAL_DATA_BULK_SIZE: usize = 10;

/// Tunables of an instance. Offsets and the fee threshold are read from the
/// chain settings once, when the instance starts.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConf {
    pub loop_duration: Duration,
    pub valset_manager_loop_duration: Duration,
    pub relayer_loop_duration: Duration,
    pub updater_loop_duration: Duration,
    pub max_claims_per_bulk: usize,
    pub confirmation_delay: u64,
    pub blocks_to_search: u64,
    pub auto_resync_interval: Duration,
    pub valset_offset: Duration,
    pub batch_offset: Duration,
    pub min_batch_fee_usd: f64,
    /// Attempts and delay of chain reads inside one iteration
    pub read_retry: RetryPolicy,
}

impl Default for InstanceConf {
    fn default() -> Self {
        Self {
            loop_duration: DEFAULT_LOOP_DURATION,
            valset_manager_loop_duration: DEFAULT_VALSET_MANAGER_LOOP_DURATION,
            relayer_loop_duration: DEFAULT_RELAYER_LOOP_DURATION,
            updater_loop_duration: DEFAULT_UPDATER_LOOP_DURATION,
            max_claims_per_bulk: hyperion_base::settings::DEFAULT_MAX_CLAIMS_PER_BULK,
            confirmation_delay: DEFAULT_CONFIRMATION_DELAY,
            blocks_to_search: DEFAULT_BLOCKS_TO_SEARCH,
            auto_resync_interval: DEFAULT_AUTO_RESYNC_INTERVAL,
            valset_offset: Duration::from_secs(5 * 60),
            batch_offset: Duration::from_secs(2 * 60),
            min_batch_fee_usd: 0.0,
            read_retry: RetryPolicy::default(),
        }
    }
}

impl InstanceConf {
    /// Combine the chain's home parameters, its config entry and its stored
    /// settings.
    pub fn build(
        params: &CounterpartyChainParams,
        chain: Option<&hyperion_base::settings::ChainConf>,
        settings: &ChainSettings,
    ) -> ChainResult<Self> {
        let mut conf = Self {
            valset_offset: settings.valset_offset()?,
            batch_offset: settings.batch_offset()?,
            min_batch_fee_usd: settings.min_batch_fee_usd,
            confirmation_delay: params
                .confirmation_delay
                .unwrap_or(DEFAULT_CONFIRMATION_DELAY),
            ..Default::default()
        };
        if let Some(chain) = chain {
            conf.max_claims_per_bulk = chain.max_claims_per_bulk();
            if let Some(loop_duration) = chain.loop_duration() {
                conf.loop_duration = loop_duration;
            }
        }
        Ok(conf)
    }
}

/// Everything the loops of one counterparty chain share.
#[derive(Debug)]
pub struct HyperionInstance {
    params: CounterpartyChainParams,
    conf: InstanceConf,
    home: Arc<dyn HomeChain>,
    bridge: Arc<dyn BridgeContract>,
    signer: Arc<dyn EthSigner>,
    price_feed: Option<Arc<dyn PriceFeed>>,
    data_dir: Arc<DataDir>,
    metrics: Arc<CoreMetrics>,
    state: Arc<OrchestratorState>,
    cancel: CancellationToken,
}

impl HyperionInstance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: CounterpartyChainParams,
        conf: InstanceConf,
        home: Arc<dyn HomeChain>,
        bridge: Arc<dyn BridgeContract>,
        signer: Arc<dyn EthSigner>,
        price_feed: Option<Arc<dyn PriceFeed>>,
        data_dir: Arc<DataDir>,
        metrics: Arc<CoreMetrics>,
    ) -> Self {
        let state = Arc::new(OrchestratorState::new(params.locator()));
        Self {
            params,
            conf,
            home,
            bridge,
            signer,
            price_feed,
            data_dir,
            metrics,
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie the instance reads to `cancel` instead of a token of its own.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn locator(&self) -> BridgeLocator {
        self.params.locator()
    }

    pub fn hyperion_id(&self) -> u64 {
        self.params.hyperion_id
    }

    pub fn chain_id(&self) -> u64 {
        self.params.bridge_chain_id
    }

    pub fn params(&self) -> &CounterpartyChainParams {
        &self.params
    }

    pub fn conf(&self) -> &InstanceConf {
        &self.conf
    }

    pub fn home(&self) -> &Arc<dyn HomeChain> {
        &self.home
    }

    pub fn bridge(&self) -> &Arc<dyn BridgeContract> {
        &self.bridge
    }

    pub fn signer(&self) -> &Arc<dyn EthSigner> {
        &self.signer
    }

    pub fn price_feed(&self) -> Option<&Arc<dyn PriceFeed>> {
        self.price_feed.as_ref()
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data_dir
    }

    pub fn metrics(&self) -> &CoreMetrics {
        &self.metrics
    }

    pub fn state(&self) -> &Arc<OrchestratorState> {
        &self.state
    }

    /// Cancelled when the instance is stopped.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run a chain read under the instance retry policy. A stale endpoint
    /// error rotates the bridge endpoint before the next attempt.
    pub async fn read<T, F, Fut>(&self, what: &str, op: F) -> ChainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChainResult<T>>,
    {
        retry(&self.cancel, self.conf.read_retry, op, |attempt, error| {
            if error.is_stale_endpoint() {
                self.bridge.rotate_endpoint();
            }
            warn!(attempt, ?error, operation = what, "Retrying failed read");
        })
        .await
    }

    pub(crate) fn chain_label(&self) -> String {
        self.chain_id().to_string()
    }

    /// Post-process the result of a home chain broadcast: a sequence
    /// mismatch resets the client, an application error is surfaced in the
    /// error status.
    pub async fn checked_broadcast<T>(&self, result: ChainResult<T>) -> ChainResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.is_sequence_mismatch() => {
                warn!(?err, "Resetting home chain client");
                self.home.reset().await;
                Err(err)
            }
            Err(err) => {
                if err.is_insufficient_fee() {
                    self.state.set_error_status(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Record a paid counterparty submission in the fee ledger and metrics.
    pub async fn record_submission(
        &self,
        kind: FeeKind,
        outcome: &TxOutcome,
        token: H160,
        fees_taken: U256,
    ) {
        self.metrics
            .submissions()
            .with_label_values(&[&self.chain_label(), kind.as_str()])
            .inc();
        self.state.add(&format!("{}_relayed", kind.as_str()), 1);
        let block_height = match self.bridge.latest_block().await {
            Ok(height) => height,
            Err(err) => {
                warn!(?err, "Could not read block height for the fee record");
                0
            }
        };
        let record = FeeRecord::new(
            self.chain_id(),
            kind,
            outcome,
            token,
            fees_taken,
            block_height,
        );
        if let Err(err) = self.data_dir.append_fee(record) {
            warn!(?err, "Failed to append fee record");
        }
    }
}
