use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use tracing::{debug, instrument};

use hyperion_core::{ChainCommunicationError, ChainId, ChainResult, PriceFeed, H160};

use crate::settings::PriceFeedConf;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CACHED_QUOTES: u64 = 10_000;

#[derive(Debug, Deserialize)]
struct Quote {
    usd: f64,
}

/// USD quotes fetched from `GET {base_url}/v1/price/{chain_id}/{token}`,
/// which answers `{"usd": <price>}`. Quotes are cached for the configured
/// time to live.
#[derive(Debug, Clone)]
pub struct HttpPriceFeed {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cache: Cache<(ChainId, H160), f64>,
}

impl HttpPriceFeed {
    /// Build from settings.
    pub fn new(conf: &PriceFeedConf) -> ChainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ChainCommunicationError::from_other)?;
        Ok(Self {
            client,
            base_url: conf.base_url.trim_end_matches('/').to_owned(),
            api_key: conf.api_key.clone(),
            cache: Cache::builder()
                .max_capacity(MAX_CACHED_QUOTES)
                .time_to_live(Duration::from_secs(conf.cache_ttl_secs))
                .build(),
        })
    }

    fn url(&self, chain_id: ChainId, token: H160) -> String {
        format!("{}/v1/price/{chain_id}/{token:?}", self.base_url)
    }

    async fn fetch(&self, chain_id: ChainId, token: H160) -> ChainResult<f64> {
        let mut request = self.client.get(self.url(chain_id, token));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let quote: Quote = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(ChainCommunicationError::from_other)?
            .json()
            .await
            .map_err(ChainCommunicationError::from_other)?;
        if !quote.usd.is_finite() || quote.usd < 0.0 {
            return Err(ChainCommunicationError::ParseError(format!(
                "invalid usd price {} for {token:?}",
                quote.usd
            )));
        }
        debug!(usd = quote.usd, "Fetched token price");
        Ok(quote.usd)
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    #[instrument(skip(self))]
    async fn usd_price(&self, chain_id: ChainId, token: H160) -> ChainResult<f64> {
        self.cache
            .try_get_with((chain_id, token), self.fetch(chain_id, token))
            .await
            .map_err(|err: Arc<ChainCommunicationError>| {
                ChainCommunicationError::CustomError(err.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_quote_url() {
        let feed = HttpPriceFeed::new(&PriceFeedConf {
            base_url: "https://prices.example/".into(),
            api_key: None,
            cache_ttl_secs: 60,
        })
        .unwrap();
        assert_eq!(
            feed.url(1, H160::repeat_byte(0xab)),
            "https://prices.example/v1/price/1/0xabababababababababababababababababababab"
        );
    }

    #[tokio::test]
    async fn cached_quotes_skip_the_network() {
        let feed = HttpPriceFeed::new(&PriceFeedConf {
            base_url: "http://127.0.0.1:9".into(),
            api_key: Some("secret".into()),
            cache_ttl_secs: 60,
        })
        .unwrap();
        let token = H160::repeat_byte(1);
        feed.cache.insert((97, token), 2.5).await;
        assert_eq!(feed.usd_price(97, token).await.unwrap(), 2.5);
        assert!(feed.usd_price(97, H160::repeat_byte(2)).await.is_err());
    }
}
