use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use hyperion_core::utils::u256_to_scaled_f64;
use hyperion_core::{ChainCommunicationError, ChainResult, TokenFees};

use crate::instance::{HyperionInstance, LoopKind, OrchestratorLoop};

/// Asks the home chain to form batches for tokens whose pending fees are
/// worth relaying.
#[derive(Debug)]
pub struct BatchCreator {
    instance: Arc<HyperionInstance>,
}

impl BatchCreator {
    pub fn new(instance: Arc<HyperionInstance>) -> Self {
        Self { instance }
    }

    async fn fees_usd(&self, fees: &TokenFees) -> ChainResult<f64> {
        let instance = &self.instance;
        let feed = instance.price_feed().ok_or_else(|| {
            ChainCommunicationError::from_other_str("no price feed configured")
        })?;
        let decimals = instance.bridge().token_decimals(fees.token).await?;
        let price = feed.usd_price(instance.chain_id(), fees.token).await?;
        Ok(u256_to_scaled_f64(fees.total_fees, decimals) * price)
    }

    /// Whether the fees of `token` clear the configured threshold. Failing to
    /// price the fees admits the token.
    async fn admit(&self, fees: &TokenFees) -> bool {
        let min = self.instance.conf().min_batch_fee_usd;
        if min <= 0.0 {
            return true;
        }
        match self.fees_usd(fees).await {
            Ok(fees_usd) => {
                let admitted = fees_usd >= min;
                debug!(token = ?fees.token, fees_usd, min, admitted, "Priced unbatched fees");
                admitted
            }
            Err(err) => {
                warn!(token = ?fees.token, ?err, "Could not price batch fees, requesting anyway");
                true
            }
        }
    }

    async fn request(&self, fees: &TokenFees) -> ChainResult<()> {
        let instance = &self.instance;
        let hyperion_id = instance.hyperion_id();
        let denom = instance
            .read("token_to_denom", || {
                instance.home().token_to_denom(hyperion_id, fees.token)
            })
            .await?;
        let result = instance.home().request_batch(hyperion_id, &denom).await;
        let response = instance.checked_broadcast(result).await?;
        info!(
            token = ?fees.token,
            %denom,
            txs = fees.tx_count,
            tx_hash = %response.tx_hash,
            "Requested batch"
        );
        Ok(())
    }
}

#[async_trait]
impl OrchestratorLoop for BatchCreator {
    fn kind(&self) -> LoopKind {
        LoopKind::BatchCreator
    }

    fn interval(&self) -> Duration {
        self.instance.conf().loop_duration
    }

    #[instrument(skip(self))]
    async fn tick(&mut self) -> ChainResult<()> {
        let instance = self.instance.clone();
        let hyperion_id = instance.hyperion_id();
        let unbatched = instance
            .read("unbatched_tokens_with_fees", || {
                instance.home().unbatched_tokens_with_fees(hyperion_id)
            })
            .await?;
        let mut first_error = None;
        for fees in unbatched {
            if !self.admit(&fees).await {
                continue;
            }
            match self.request(&fees).await {
                Ok(()) => instance.state().add("batch_requests", 1),
                Err(err) => {
                    warn!(token = ?fees.token, ?err, "Batch request failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use hyperion_core::test_utils::address;
    use hyperion_core::U256;

    use super::*;
    use crate::test_utils::{tx_response, MockBridge, MockHome, MockPriceFeed, TestInstance};

    fn fifty_tokens() -> TokenFees {
        TokenFees {
            token: address(0xcc),
            total_fees: U256::from(50u64) * U256::exp10(18),
            tx_count: 3,
        }
    }

    fn instance(min_batch_fee_usd: f64, requests: usize) -> Arc<HyperionInstance> {
        let mut home = MockHome::new();
        home.expect_unbatched_tokens_with_fees()
            .returning(|_| Ok(vec![fifty_tokens()]));
        home.expect_token_to_denom()
            .returning(|_, _| Ok("hyperion0xcc".into()));
        home.expect_request_batch()
            .withf(|hid, denom| *hid == 1 && denom == "hyperion0xcc")
            .times(requests)
            .returning(|_, _| Ok(tx_response()));

        let mut bridge = MockBridge::new();
        bridge.expect_token_decimals().returning(|_| Ok(18));
        let mut feed = MockPriceFeed::new();
        feed.expect_usd_price().returning(|_, _| Ok(1.0));

        TestInstance::with(home, bridge)
            .price_feed(feed)
            .conf(|conf| conf.min_batch_fee_usd = min_batch_fee_usd)
            .build()
    }

    #[tokio::test]
    async fn admits_fees_above_threshold() {
        let instance = instance(49.0, 1);
        BatchCreator::new(instance.clone()).tick().await.unwrap();
        assert_eq!(instance.state().counter("batch_requests"), 1);
    }

    #[tokio::test]
    async fn skips_fees_below_threshold() {
        BatchCreator::new(instance(51.0, 0)).tick().await.unwrap();
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn fails_open_when_pricing_fails() {
        let mut home = MockHome::new();
        home.expect_unbatched_tokens_with_fees()
            .returning(|_| Ok(vec![fifty_tokens()]));
        home.expect_token_to_denom()
            .returning(|_, _| Ok("hyperion0xcc".into()));
        home.expect_request_batch()
            .times(1)
            .returning(|_, _| Ok(tx_response()));
        let mut bridge = MockBridge::new();
        bridge
            .expect_token_decimals()
            .returning(|_| Err(ChainCommunicationError::NoClients));

        let instance = TestInstance::with(home, bridge)
            .price_feed(MockPriceFeed::new())
            .conf(|conf| conf.min_batch_fee_usd = 1_000.0)
            .build();
        BatchCreator::new(instance).tick().await.unwrap();
        assert!(logs_contain("Could not price batch fees"));
    }

    #[tokio::test]
    async fn failing_token_does_not_block_the_others() {
        let mut home = MockHome::new();
        home.expect_unbatched_tokens_with_fees().returning(|_| {
            Ok(vec![
                TokenFees {
                    token: address(0xaa),
                    ..fifty_tokens()
                },
                fifty_tokens(),
            ])
        });
        home.expect_token_to_denom().returning(|_, token| {
            if token == address(0xaa) {
                Err(ChainCommunicationError::CustomError("denom not found".into()))
            } else {
                Ok("hyperion0xcc".into())
            }
        });
        home.expect_request_batch()
            .withf(|_, denom| denom == "hyperion0xcc")
            .times(1)
            .returning(|_, _| Ok(tx_response()));

        let instance = TestInstance::with(home, MockBridge::new()).build();
        let result = BatchCreator::new(instance.clone()).tick().await;
        assert!(matches!(result, Err(ChainCommunicationError::CustomError(_))));
        assert_eq!(instance.state().counter("batch_requests"), 1);
    }
}
