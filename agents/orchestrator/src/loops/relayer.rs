use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use hyperion_base::FeeKind;
use hyperion_core::{BatchConfirm, ChainResult, OutgoingBatch};

use crate::instance::{HyperionInstance, LoopKind, OrchestratorLoop};

/// Submits confirmed batches to the bridge contract.
#[derive(Debug)]
pub struct Relayer {
    instance: Arc<HyperionInstance>,
}

impl Relayer {
    pub fn new(instance: Arc<HyperionInstance>) -> Self {
        Self { instance }
    }

    /// Oldest batch of this deployment with at least one confirmation.
    async fn oldest_confirmed_batch(
        &self,
    ) -> ChainResult<Option<(OutgoingBatch, Vec<BatchConfirm>)>> {
        let instance = &self.instance;
        let home = instance.home();
        let hyperion_id = instance.hyperion_id();
        let mut batches: Vec<_> = instance
            .read("latest_transaction_batches", || {
                home.latest_transaction_batches(hyperion_id)
            })
            .await?
            .into_iter()
            .filter(|batch| batch.hyperion_id == hyperion_id)
            .collect();
        batches.sort_by_key(|batch| (batch.block, batch.batch_nonce));

        for batch in batches {
            let confirms = instance
                .read("batch_confirms", || {
                    home.batch_confirms(hyperion_id, batch.batch_nonce, batch.token_contract)
                })
                .await?;
            if !confirms.is_empty() {
                return Ok(Some((batch, confirms)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl OrchestratorLoop for Relayer {
    fn kind(&self) -> LoopKind {
        LoopKind::Relayer
    }

    fn interval(&self) -> Duration {
        self.instance.conf().relayer_loop_duration
    }

    #[instrument(skip(self))]
    async fn tick(&mut self) -> ChainResult<()> {
        let instance = self.instance.clone();
        let Some(current_valset) = instance.state().eth_valset() else {
            debug!("Contract valset unknown, skipping batch relay");
            return Ok(());
        };
        if !instance.state().is_synced() {
            debug!("Contract valset not synced, skipping batch relay");
            return Ok(());
        }
        let Some((batch, confirms)) = self.oldest_confirmed_batch().await? else {
            return Ok(());
        };

        let created_at = instance
            .read("block_time", || instance.home().block_time(batch.block))
            .await?;
        let age = SystemTime::now()
            .duration_since(created_at)
            .unwrap_or_default();
        if age < instance.conf().batch_offset {
            debug!(nonce = batch.batch_nonce, ?age, "Batch not old enough to relay");
            return Ok(());
        }

        info!(
            nonce = batch.batch_nonce,
            token = ?batch.token_contract,
            txs = batch.transactions.len(),
            confirms = confirms.len(),
            "Relaying batch"
        );
        match instance
            .bridge()
            .submit_batch(&current_valset, &batch, &confirms)
            .await
        {
            Ok(outcome) => {
                info!(tx_hash = ?outcome.tx_hash, nonce = batch.batch_nonce, "Batch submitted");
                instance.state().clear_error_status();
                instance
                    .record_submission(
                        FeeKind::Batch,
                        &outcome,
                        batch.token_contract,
                        batch.total_fees(),
                    )
                    .await;
                Ok(())
            }
            Err(err) if err.is_insufficient_funds() => {
                instance.state().set_error_status(err.to_string());
                Err(err)
            }
            Err(err) => {
                warn!(?err, nonce = batch.batch_nonce, "Batch submission failed, retrying next tick");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use hyperion_core::test_utils::{address, batch, valset};
    use hyperion_core::ChainCommunicationError;

    use super::*;
    use crate::test_utils::{aged, tx_outcome, MockBridge, MockHome, TestInstance};

    fn batch_confirm(nonce: u64) -> BatchConfirm {
        BatchConfirm {
            nonce,
            token_contract: address(0xcc),
            orchestrator: "helios1member".into(),
            eth_address: address(1),
            signature: "00".repeat(65),
        }
    }

    fn synced(instance: &HyperionInstance) {
        instance.state().set_eth_valset(Some(valset(4, 3)));
        instance.state().set_synced(true);
    }

    fn home_with_batches() -> MockHome {
        let mut home = MockHome::new();
        home.expect_latest_transaction_batches().returning(|_| {
            let mut newer = batch(1, 8, address(0xcc));
            newer.block = 90;
            Ok(vec![newer, batch(1, 7, address(0xcc)), batch(2, 3, address(0xcc))])
        });
        home.expect_batch_confirms()
            .returning(|_, nonce, _| Ok(vec![batch_confirm(nonce)]));
        home.expect_block_time()
            .returning(|_| Ok(aged(Duration::from_secs(600))));
        home
    }

    #[tokio::test]
    async fn submits_the_oldest_confirmed_batch() {
        let mut bridge = MockBridge::new();
        bridge
            .expect_submit_batch()
            .withf(|valset, batch, confirms| {
                valset.nonce == 4 && batch.batch_nonce == 7 && confirms.len() == 1
            })
            .times(1)
            .returning(|_, _, _| Ok(tx_outcome()));
        bridge.expect_latest_block().returning(|| Ok(300));

        let instance = TestInstance::with(home_with_batches(), bridge).build();
        synced(&instance);
        Relayer::new(instance.clone()).tick().await.unwrap();

        let fees = instance.data_dir().fees(Some(97)).unwrap();
        assert_eq!(fees.len(), 1);
        assert_eq!(instance.state().counter("batch_relayed"), 1);
    }

    #[tokio::test]
    async fn skips_without_contract_valset() {
        let mut home = MockHome::new();
        home.expect_latest_transaction_batches().never();
        let instance = TestInstance::with(home, MockBridge::new()).build();
        Relayer::new(instance).tick().await.unwrap();
    }

    #[tokio::test]
    async fn skips_while_the_contract_lags_behind() {
        let mut home = MockHome::new();
        home.expect_latest_transaction_batches().never();
        let instance = TestInstance::with(home, MockBridge::new()).build();
        instance.state().set_eth_valset(Some(valset(4, 3)));
        Relayer::new(instance).tick().await.unwrap();
    }

    #[tokio::test]
    async fn reverts_are_swallowed_but_missing_funds_are_not() {
        let mut bridge = MockBridge::new();
        bridge
            .expect_submit_batch()
            .times(1)
            .returning(|_, _, _| Err(ChainCommunicationError::VmException("reverted".into())));
        let instance = TestInstance::with(home_with_batches(), bridge).build();
        synced(&instance);
        Relayer::new(instance.clone()).tick().await.unwrap();
        assert_eq!(instance.state().error_status(), None);

        let mut bridge = MockBridge::new();
        bridge.expect_submit_batch().returning(|_, _, _| {
            Err(ChainCommunicationError::InsufficientFunds("balance 0".into()))
        });
        let instance = TestInstance::with(home_with_batches(), bridge).build();
        synced(&instance);
        assert!(Relayer::new(instance.clone()).tick().await.is_err());
        assert!(instance.state().error_status().is_some());
    }

    #[tokio::test]
    async fn young_batches_wait_for_the_offset() {
        let mut home = MockHome::new();
        home.expect_latest_transaction_batches()
            .returning(|_| Ok(vec![batch(1, 7, address(0xcc))]));
        home.expect_batch_confirms()
            .returning(|_, nonce, _| Ok(vec![batch_confirm(nonce)]));
        home.expect_block_time()
            .returning(|_| Ok(aged(Duration::from_secs(5))));
        let mut bridge = MockBridge::new();
        bridge.expect_submit_batch().never();

        let instance = TestInstance::with(home, bridge)
            .conf(|conf| conf.batch_offset = Duration::from_secs(120))
            .build();
        synced(&instance);
        Relayer::new(instance).tick().await.unwrap();
    }
}
