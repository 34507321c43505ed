use std::fmt::Debug;

use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::{ChainId, ChainResult, H160};

/// USD quotes for counterparty tokens.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait PriceFeed: Send + Sync + Debug {
    /// Price of one whole `token` in USD.
    async fn usd_price(&self, chain_id: ChainId, token: H160) -> ChainResult<f64>;
}

/// Discovery and liveness probing of public endpoints.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait EndpointDiscovery: Send + Sync + Debug {
    /// Public endpoints advertised for `chain_id`.
    async fn discover(&self, chain_id: ChainId) -> ChainResult<Vec<String>>;

    /// Run a trivial read against `url`, returning the latest block.
    async fn probe(&self, chain_id: ChainId, url: &str) -> ChainResult<u64>;
}
