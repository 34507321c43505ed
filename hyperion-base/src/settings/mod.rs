//! Common settings and configuration for Hyperion agents
//!
//! Agents read settings from the config files, then from the environment and
//! finally from program arguments, later sources taking precedence:
//!
//! 1. Every `./config/*.json` file, in file name order.
//! 2. The files listed in `CONFIG_FILES`, comma separated, in order.
//! 3. Environment variables prefixed with `HYPERION_`, where `__` separates
//!    path segments. `HYPERION_HOME__CHAIN_ID=helios-1` overrides
//!    `home.chain_id`.
//! 4. Arguments passed on the command line.
//!
//! Keys are snake_case. The loader lowercases every key, so chain names in
//! `chains` end up lowercase too.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result};
use serde::Deserialize;

use hyperion_core::{ChainId, HyperionId};
use hyperion_ethereum::DEFAULT_CHAINLIST_URL;
use hyperion_helios::{
    ConnectionConf, HeliosClient, DEFAULT_FEE_DENOM, DEFAULT_PREFIX, DEFAULT_PUBKEY_TYPE_URL,
};

pub use loader::*;
pub use signers::*;
pub use trace::*;

mod loader;
mod signers;
mod trace;

/// Default oracle bulk size.
pub const DEFAULT_MAX_CLAIMS_PER_BULK: usize = 50;

/// Connection to the home chain.
#[derive(Debug, Clone, Deserialize)]
pub struct HomeConf {
    /// Tendermint RPC endpoints
    pub rpc_urls: Vec<String>,
    /// Chain id, e.g. `helios-1`
    pub chain_id: String,
    /// Bech32 account prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Price of one unit of gas in `fee_denom`
    #[serde(default = "default_gas_price")]
    pub gas_price: f64,
    /// Multiplier applied to simulated gas
    #[serde(default = "default_gas_adjustment")]
    pub gas_adjustment: f64,
    /// Denom fees are paid in
    #[serde(default = "default_fee_denom")]
    pub fee_denom: String,
    /// Type url of the account public key
    #[serde(default = "default_pubkey_type_url")]
    pub pubkey_type_url: String,
    /// Per attempt timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_owned()
}

fn default_gas_price() -> f64 {
    1_000_000_000.0
}

fn default_gas_adjustment() -> f64 {
    1.5
}

fn default_fee_denom() -> String {
    DEFAULT_FEE_DENOM.to_owned()
}

fn default_pubkey_type_url() -> String {
    DEFAULT_PUBKEY_TYPE_URL.to_owned()
}

fn default_timeout_secs() -> u64 {
    10
}

impl HomeConf {
    /// Connection config of the home chain client.
    pub fn connection_conf(&self) -> ConnectionConf {
        ConnectionConf::new(
            self.rpc_urls.clone(),
            self.chain_id.clone(),
            self.prefix.clone(),
            self.fee_denom.clone(),
            self.gas_price,
            self.gas_adjustment,
            Duration::from_secs(self.timeout_secs),
        )
    }
}

/// A counterparty chain known to this orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConf {
    /// EVM chain id
    pub chain_id: ChainId,
    /// Bridge deployment on the home chain
    pub hyperion_id: HyperionId,
    /// Preferred endpoints, tried before persisted and discovered ones
    #[serde(default)]
    pub rpcs: Vec<String>,
    /// Overrides the oracle bulk size
    #[serde(default)]
    pub oracle_max_claims_msg_per_bulk: Option<usize>,
    /// Overrides the period of the one minute loops
    #[serde(default)]
    pub loop_duration_secs: Option<u64>,
    /// Start this chain on boot even without a runner marker
    #[serde(default)]
    pub auto_start: bool,
}

impl ChainConf {
    /// Oracle bulk size.
    pub fn max_claims_per_bulk(&self) -> usize {
        self.oracle_max_claims_msg_per_bulk
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CLAIMS_PER_BULK)
    }

    /// Period override of the one minute loops.
    pub fn loop_duration(&self) -> Option<Duration> {
        self.loop_duration_secs.map(Duration::from_secs)
    }
}

/// Admin server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConf {
    /// Port of the admin API and `/metrics`
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConf {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Token price source used for batch admission.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceFeedConf {
    /// Base url of the price API
    pub base_url: String,
    /// Sent as `x-api-key`
    #[serde(default)]
    pub api_key: Option<String>,
    /// How long a quote is reused
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

/// Settings shared by every Hyperion agent.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Home chain connection
    pub home: HomeConf,
    /// Orchestrator key
    pub signer: SignerConf,
    /// Counterparty chains by name
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConf>,
    /// Logging
    #[serde(default)]
    pub tracing: TracingConfig,
    /// Admin server
    #[serde(default)]
    pub server: ServerConf,
    /// Root of the persisted JSON files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Price feed, batch admission is unconditional without one
    #[serde(default)]
    pub price_feed: Option<PriceFeedConf>,
    /// Registry of public endpoints
    #[serde(default = "default_chainlist_url")]
    pub chainlist_url: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_chainlist_url() -> String {
    DEFAULT_CHAINLIST_URL.to_owned()
}

impl AsRef<Settings> for Settings {
    fn as_ref(&self) -> &Settings {
        self
    }
}

impl Settings {
    /// Configuration of the counterparty chain with `chain_id`.
    pub fn chain(&self, chain_id: ChainId) -> Option<&ChainConf> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    /// Build the process wide home chain client.
    pub fn build_home_client(&self) -> Result<HeliosClient> {
        let signer = self
            .signer
            .build_helios(&self.home.prefix, &self.home.pubkey_type_url)?;
        HeliosClient::new(self.home.connection_conf(), signer)
            .context("Building home chain client")
    }
}
