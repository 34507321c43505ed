//! Mocks and an instance builder for loop tests.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use prometheus::Registry;

use hyperion_base::{CoreMetrics, DataDir};
use hyperion_core::{
    BatchConfirm, BridgeContract, BridgeEvent, BridgeEvents, BridgeLocator, CallOutcome,
    ChainId, ChainResult, CounterpartyChainParams, EndpointDiscovery, ExternalCallTx,
    ExternalDataClaim, HomeChain, HomeTxResponse, HyperionId, HyperionParams, InitOutcome,
    LastClaimEvent, OutgoingBatch, PriceFeed, RetryPolicy, SignedDigest, SkippedTx, TokenFees,
    TxOutcome, Valset, ValsetConfirm, ValsetUpdatedEvent, H160, H256, U256,
};
use hyperion_base::settings::Settings;
use hyperion_ethereum::{ChainlistDiscovery, EthereumSigner};

use crate::instance::{HyperionInstance, InstanceConf};
use crate::orchestrator::InstanceManager;

/// Key of the test orchestrator.
pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const TEST_CHAIN_ID: ChainId = 97;
pub const TEST_HYPERION_ID: HyperionId = 1;
pub const TEST_ORCHESTRATOR: &str = "helios1orchestrator";

mockall::mock! {
    pub Bridge {}

    impl Debug for Bridge {
        fn fmt<'a>(&self, f: &mut std::fmt::Formatter<'a>) -> std::fmt::Result;
    }

    #[async_trait]
    impl BridgeContract for Bridge {
        fn locator(&self) -> BridgeLocator;
        fn address(&self) -> H160;
        fn sender(&self) -> H160;
        fn rotate_endpoint(&self);
        async fn latest_block(&self) -> ChainResult<u64>;
        async fn state_last_valset_nonce(&self) -> ChainResult<u64>;
        async fn state_last_valset_checkpoint(&self) -> ChainResult<H256>;
        async fn state_last_event_nonce(&self) -> ChainResult<u64>;
        async fn state_last_valset_height(&self) -> ChainResult<u64>;
        async fn state_last_event_height(&self) -> ChainResult<u64>;
        async fn last_batch_nonce(&self, token: H160) -> ChainResult<u64>;
        async fn state_hyperion_id(&self) -> ChainResult<H256>;
        async fn token_decimals(&self, token: H160) -> ChainResult<u8>;
        async fn token_symbol(&self, token: H160) -> ChainResult<String>;
        async fn filter_events(&self, start: u64, end: u64) -> ChainResult<BridgeEvents>;
        async fn filter_valset_updated(&self, start: u64, end: u64)
            -> ChainResult<Vec<ValsetUpdatedEvent>>;
        async fn submit_batch(
            &self,
            current_valset: &Valset,
            batch: &OutgoingBatch,
            confirms: &[BatchConfirm],
        ) -> ChainResult<TxOutcome>;
        async fn update_valset(
            &self,
            old_valset: &Valset,
            new_valset: &Valset,
            confirms: &[ValsetConfirm],
        ) -> ChainResult<TxOutcome>;
        async fn send_to_home(&self, erc20: H160, amount: U256, recipient: &[u8])
            -> ChainResult<TxOutcome>;
        async fn deploy_erc20(&self, denom: &str, name: &str, symbol: &str, decimals: u8)
            -> ChainResult<TxOutcome>;
        async fn initialize(&self, hyperion_id: HyperionId, power_threshold: u64, valset: &Valset)
            -> ChainResult<InitOutcome>;
        async fn emergency_pause(&self) -> ChainResult<TxOutcome>;
        async fn emergency_unpause(&self) -> ChainResult<TxOutcome>;
        async fn paused(&self) -> ChainResult<bool>;
        async fn call_at(&self, to: H160, data: Vec<u8>, block: u64) -> ChainResult<CallOutcome>;
    }
}

mockall::mock! {
    pub Home {}

    impl Debug for Home {
        fn fmt<'a>(&self, f: &mut std::fmt::Formatter<'a>) -> std::fmt::Result;
    }

    #[async_trait]
    impl HomeChain for Home {
        fn orchestrator_address(&self) -> String;
        fn eth_address(&self) -> H160;
        async fn params(&self) -> ChainResult<HyperionParams>;
        async fn latest_block_height(&self) -> ChainResult<u64>;
        async fn block_time(&self, height: u64) -> ChainResult<SystemTime>;
        async fn last_claim_event(&self, hyperion_id: HyperionId) -> ChainResult<LastClaimEvent>;
        async fn oldest_unsigned_valsets(&self, hyperion_id: HyperionId) -> ChainResult<Vec<Valset>>;
        async fn oldest_unsigned_batch(&self, hyperion_id: HyperionId)
            -> ChainResult<Option<OutgoingBatch>>;
        async fn latest_valsets(&self, hyperion_id: HyperionId) -> ChainResult<Vec<Valset>>;
        async fn current_valset(&self, hyperion_id: HyperionId) -> ChainResult<Valset>;
        async fn valset_confirms(&self, hyperion_id: HyperionId, nonce: u64)
            -> ChainResult<Vec<ValsetConfirm>>;
        async fn latest_transaction_batches(&self, hyperion_id: HyperionId)
            -> ChainResult<Vec<OutgoingBatch>>;
        async fn batch_confirms(&self, hyperion_id: HyperionId, nonce: u64, token: H160)
            -> ChainResult<Vec<BatchConfirm>>;
        async fn unbatched_tokens_with_fees(&self, hyperion_id: HyperionId)
            -> ChainResult<Vec<TokenFees>>;
        async fn token_to_denom(&self, hyperion_id: HyperionId, token: H160) -> ChainResult<String>;
        async fn external_call_txs(&self, hyperion_id: HyperionId) -> ChainResult<Vec<ExternalCallTx>>;
        async fn skipped_txs(&self, hyperion_id: HyperionId) -> ChainResult<Vec<SkippedTx>>;
        async fn send_claims(&self, hyperion_id: HyperionId, events: &[BridgeEvent])
            -> ChainResult<HomeTxResponse>;
        async fn simulate_external_data_claim(&self, claim: &ExternalDataClaim) -> ChainResult<()>;
        async fn send_external_data_claims(&self, claims: &[ExternalDataClaim])
            -> ChainResult<HomeTxResponse>;
        async fn send_valset_confirm(&self, hyperion_id: HyperionId, nonce: u64, signed: &SignedDigest)
            -> ChainResult<HomeTxResponse>;
        async fn send_batch_confirm(
            &self,
            hyperion_id: HyperionId,
            batch: &OutgoingBatch,
            signed: &SignedDigest,
        ) -> ChainResult<HomeTxResponse>;
        async fn request_batch(&self, hyperion_id: HyperionId, denom: &str)
            -> ChainResult<HomeTxResponse>;
        async fn reset(&self);
    }
}

mockall::mock! {
    pub PriceFeed {}

    impl Debug for PriceFeed {
        fn fmt<'a>(&self, f: &mut std::fmt::Formatter<'a>) -> std::fmt::Result;
    }

    #[async_trait]
    impl PriceFeed for PriceFeed {
        async fn usd_price(&self, chain_id: ChainId, token: H160) -> ChainResult<f64>;
    }
}

mockall::mock! {
    pub Discovery {}

    impl Debug for Discovery {
        fn fmt<'a>(&self, f: &mut std::fmt::Formatter<'a>) -> std::fmt::Result;
    }

    #[async_trait]
    impl EndpointDiscovery for Discovery {
        async fn discover(&self, chain_id: ChainId) -> ChainResult<Vec<String>>;
        async fn probe(&self, chain_id: ChainId, url: &str) -> ChainResult<u64>;
    }
}

pub fn tx_response() -> HomeTxResponse {
    HomeTxResponse {
        tx_hash: "ABCDEF".into(),
        height: Some(1),
        gas_used: 100_000,
    }
}

pub fn tx_outcome() -> TxOutcome {
    TxOutcome {
        tx_hash: H256::repeat_byte(0x11),
        gas_cost: U256::from(21_000u64),
    }
}

pub fn test_signer() -> EthereumSigner {
    EthereumSigner::from_hex(TEST_KEY).unwrap()
}

/// A fresh data directory that outlives the test.
pub fn data_dir() -> Arc<DataDir> {
    let root = tempfile::tempdir().unwrap().into_path();
    Arc::new(DataDir::open(root).unwrap())
}

/// Home chain block times `age` in the past.
pub fn aged(age: Duration) -> SystemTime {
    SystemTime::now() - age
}

/// Builds a `HyperionInstance` around mocked chains. Offsets default to zero
/// so age gates pass unless a test sets them, and reads are tried once.
#[derive(Debug)]
pub struct TestInstance {
    home: MockHome,
    bridge: MockBridge,
    price_feed: Option<MockPriceFeed>,
    params: CounterpartyChainParams,
    conf: InstanceConf,
}

impl Default for TestInstance {
    fn default() -> Self {
        Self::with(MockHome::new(), MockBridge::new())
    }
}

impl TestInstance {
    pub fn with(home: MockHome, bridge: MockBridge) -> Self {
        Self {
            home,
            bridge,
            price_feed: None,
            params: CounterpartyChainParams {
                hyperion_id: TEST_HYPERION_ID,
                bridge_chain_id: TEST_CHAIN_ID,
                bridge_chain_name: "bsc-testnet".into(),
                bridge_contract_address: H160::repeat_byte(0xbb),
                bridge_contract_start_height: 100,
                ..Default::default()
            },
            conf: InstanceConf {
                valset_offset: Duration::ZERO,
                batch_offset: Duration::ZERO,
                read_retry: RetryPolicy::new(1, Duration::ZERO),
                ..Default::default()
            },
        }
    }

    pub fn start_height(mut self, height: u64) -> Self {
        self.params.bridge_contract_start_height = height;
        self
    }

    pub fn max_claims_per_bulk(mut self, max: usize) -> Self {
        self.conf.max_claims_per_bulk = max;
        self
    }

    pub fn price_feed(mut self, feed: MockPriceFeed) -> Self {
        self.price_feed = Some(feed);
        self
    }

    pub fn conf(mut self, update: impl FnOnce(&mut InstanceConf)) -> Self {
        update(&mut self.conf);
        self
    }

    pub fn build(self) -> Arc<HyperionInstance> {
        let metrics = CoreMetrics::new("test", Registry::new()).unwrap();
        Arc::new(HyperionInstance::new(
            self.params,
            self.conf,
            Arc::new(self.home),
            Arc::new(self.bridge),
            Arc::new(test_signer()),
            self.price_feed
                .map(|feed| Arc::new(feed) as Arc<dyn PriceFeed>),
            data_dir(),
            Arc::new(metrics),
        ))
    }
}

/// A manager whose home chain and registries are unreachable, over a fresh
/// data directory. Chain 97 is configured with `auto_start`.
pub fn offline_manager() -> Arc<InstanceManager> {
    let data_dir = data_dir();
    let settings: Settings = serde_json::from_value(serde_json::json!({
        "home": {"rpc_urls": ["http://127.0.0.1:1"], "chain_id": "helios-test"},
        "signer": {"type": "hex_key", "key": TEST_KEY},
        "chains": {
            "bsc-testnet": {"chain_id": TEST_CHAIN_ID, "hyperion_id": TEST_HYPERION_ID, "auto_start": true}
        },
        "data_dir": data_dir.root(),
    }))
    .unwrap();
    let home = Arc::new(settings.build_home_client().unwrap());
    let metrics = Arc::new(CoreMetrics::new("test", Registry::new()).unwrap());
    Arc::new(InstanceManager::new(
        settings,
        home,
        Arc::new(test_signer()),
        data_dir,
        metrics,
        None,
        Arc::new(ChainlistDiscovery::new("http://127.0.0.1:1/rpcs.json")),
    ))
}
