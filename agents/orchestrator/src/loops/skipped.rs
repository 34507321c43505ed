use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use hyperion_core::{BridgeEvent, ChainResult};

use crate::instance::{HyperionInstance, LoopKind, OrchestratorLoop};

/// Resubmits claims for events the home chain reports as skipped.
#[derive(Debug)]
pub struct SkippedRecovery {
    instance: Arc<HyperionInstance>,
}

impl SkippedRecovery {
    pub fn new(instance: Arc<HyperionInstance>) -> Self {
        Self { instance }
    }
}

#[async_trait]
impl OrchestratorLoop for SkippedRecovery {
    fn kind(&self) -> LoopKind {
        LoopKind::Skipped
    }

    fn interval(&self) -> Duration {
        self.instance.conf().loop_duration
    }

    #[instrument(skip(self))]
    async fn tick(&mut self) -> ChainResult<()> {
        let instance = self.instance.clone();
        let hyperion_id = instance.hyperion_id();
        let skipped = instance.home().skipped_txs(hyperion_id).await?;
        let skipped: Vec<_> = skipped
            .into_iter()
            .filter(|tx| tx.hyperion_id == hyperion_id)
            .collect();
        if skipped.is_empty() {
            return Ok(());
        }

        let nonces: BTreeSet<u64> = skipped.iter().map(|tx| tx.nonce).collect();
        let ranges: BTreeSet<(u64, u64)> = skipped
            .iter()
            .map(|tx| (tx.start_height, tx.end_height))
            .collect();

        let mut recovered: BTreeMap<u64, BridgeEvent> = BTreeMap::new();
        for (start, end) in ranges {
            let mut events = instance.bridge().filter_events(start, end).await?;
            events.retain(|nonce| nonces.contains(&nonce));
            for event in events.into_sorted() {
                recovered.entry(event.event_nonce()).or_insert(event);
            }
        }

        let missing: Vec<_> = nonces
            .iter()
            .filter(|nonce| !recovered.contains_key(nonce))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "Skipped events not found in the reported ranges");
        }
        if recovered.is_empty() {
            return Ok(());
        }

        let events: Vec<_> = recovered.into_values().collect();
        for bulk in events.chunks(instance.conf().max_claims_per_bulk.max(1)) {
            let result = instance.home().send_claims(hyperion_id, bulk).await;
            let response = instance.checked_broadcast(result).await?;
            info!(
                nonces = ?bulk.iter().map(|e| e.event_nonce()).collect::<Vec<_>>(),
                tx_hash = %response.tx_hash,
                "Resent skipped claims"
            );
            instance.state().add("skipped_recovered", bulk.len() as u64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hyperion_core::test_utils::deposit;
    use hyperion_core::{BridgeEvents, SkippedTx};

    use super::*;
    use crate::test_utils::{tx_response, MockBridge, MockHome, TestInstance};

    fn skipped(nonce: u64, start_height: u64, end_height: u64) -> SkippedTx {
        SkippedTx {
            hyperion_id: 1,
            nonce,
            start_height,
            end_height,
        }
    }

    #[tokio::test]
    async fn resends_exactly_the_skipped_event() {
        let mut home = MockHome::new();
        home.expect_skipped_txs()
            .returning(|_| Ok(vec![skipped(42, 1_000, 1_100), skipped(42, 1_000, 1_100)]));
        home.expect_send_claims()
            .withf(|hid, events| {
                *hid == 1 && events.len() == 1 && events[0].event_nonce() == 42
            })
            .times(1)
            .returning(|_, _| Ok(tx_response()));

        let mut bridge = MockBridge::new();
        bridge
            .expect_filter_events()
            .withf(|start, end| (*start, *end) == (1_000, 1_100))
            .times(1)
            .returning(|_, _| {
                Ok(BridgeEvents {
                    deposits: vec![deposit(41, 1_010), deposit(42, 1_050), deposit(43, 1_090)],
                    ..Default::default()
                })
            });

        let instance = TestInstance::with(home, bridge).build();
        SkippedRecovery::new(instance.clone()).tick().await.unwrap();
        assert_eq!(instance.state().counter("skipped_recovered"), 1);
    }

    #[tokio::test]
    async fn overlapping_ranges_send_each_nonce_once() {
        let mut home = MockHome::new();
        home.expect_skipped_txs()
            .returning(|_| Ok(vec![skipped(5, 10, 20), skipped(6, 15, 30)]));
        home.expect_send_claims()
            .withf(|_, events| events.iter().map(|e| e.event_nonce()).eq([5, 6]))
            .times(1)
            .returning(|_, _| Ok(tx_response()));

        let mut bridge = MockBridge::new();
        bridge.expect_filter_events().returning(|start, _| {
            let deposits = if start == 10 {
                vec![deposit(5, 12), deposit(6, 18)]
            } else {
                vec![deposit(6, 18)]
            };
            Ok(BridgeEvents {
                deposits,
                ..Default::default()
            })
        });

        let instance = TestInstance::with(home, bridge).build();
        SkippedRecovery::new(instance).tick().await.unwrap();
    }

    #[tokio::test]
    async fn nothing_skipped_is_a_noop() {
        let mut home = MockHome::new();
        home.expect_skipped_txs().returning(|_| Ok(vec![]));
        home.expect_send_claims().never();
        let mut bridge = MockBridge::new();
        bridge.expect_filter_events().never();

        let instance = TestInstance::with(home, bridge).build();
        SkippedRecovery::new(instance).tick().await.unwrap();
    }
}
