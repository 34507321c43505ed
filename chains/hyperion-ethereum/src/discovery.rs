use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::Middleware;
use serde::Deserialize;
use tracing::{debug, instrument};

use hyperion_core::{ChainCommunicationError, ChainId, ChainResult, EndpointDiscovery};

use crate::error::provider_err;
use crate::{build_provider, HyperionEthereumError};

/// Public chain registry used when no other list is configured.
pub const DEFAULT_CHAINLIST_URL: &str = "https://chainid.network/chains.json";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainlistEntry {
    chain_id: u64,
    #[serde(default)]
    rpc: Vec<String>,
}

/// Finds public endpoints in a chainlist style registry and probes them.
#[derive(Debug, Clone)]
pub struct ChainlistDiscovery {
    client: reqwest::Client,
    url: String,
}

impl ChainlistDiscovery {
    /// Use the registry at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Default for ChainlistDiscovery {
    fn default() -> Self {
        Self::new(DEFAULT_CHAINLIST_URL)
    }
}

/// Keep plain http endpoints; drop websockets and templated urls needing an api key.
fn usable_endpoints(entries: Vec<ChainlistEntry>, chain_id: ChainId) -> Vec<String> {
    let mut urls: Vec<String> = entries
        .into_iter()
        .filter(|entry| entry.chain_id == chain_id)
        .flat_map(|entry| entry.rpc)
        .filter(|url| url.starts_with("http") && !url.contains("${"))
        .collect();
    urls.dedup();
    urls
}

#[async_trait]
impl EndpointDiscovery for ChainlistDiscovery {
    #[instrument(skip(self), fields(registry = %self.url))]
    async fn discover(&self, chain_id: ChainId) -> ChainResult<Vec<String>> {
        let entries: Vec<ChainlistEntry> = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(HyperionEthereumError::from)?
            .json()
            .await
            .map_err(HyperionEthereumError::from)?;
        let urls = usable_endpoints(entries, chain_id);
        debug!(count = urls.len(), "Discovered public endpoints");
        Ok(urls)
    }

    async fn probe(&self, chain_id: ChainId, url: &str) -> ChainResult<u64> {
        let provider = build_provider(url)?;
        let probe = async {
            let reported = crate::provider::chain_id(&provider).await?;
            if reported != chain_id {
                return Err(ChainCommunicationError::CustomError(format!(
                    "{url} serves chain {reported}, expected {chain_id}"
                )));
            }
            provider
                .get_block_number()
                .await
                .map(|n| n.as_u64())
                .map_err(provider_err)
        };
        tokio::time::timeout(PROBE_TIMEOUT, probe)
            .await
            .map_err(|_| ChainCommunicationError::Timeout(PROBE_TIMEOUT))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_registry_entries() {
        let entries: Vec<ChainlistEntry> = serde_json::from_str(
            r#"[
                {"chainId": 1, "rpc": ["https://eth.example", "wss://eth.example", "https://key.example/${API_KEY}"]},
                {"chainId": 56, "rpc": ["https://bsc.example"]},
                {"chainId": 1}
            ]"#,
        )
        .unwrap();
        assert_eq!(usable_endpoints(entries, 1), vec!["https://eth.example"]);
    }
}
