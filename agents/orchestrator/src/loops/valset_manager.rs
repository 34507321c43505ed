use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use hyperion_base::FeeKind;
use hyperion_core::encode::valset_checkpoint;
use hyperion_core::{BridgeContract, ChainResult, Valset, ValsetConfirm};

use crate::instance::{HyperionInstance, LoopKind, OrchestratorLoop};

/// The valset the bridge contract currently holds, rebuilt from its last
/// `ValsetUpdatedEvent`.
///
/// The event is first looked up at `state_lastValsetHeight`. Some chains do
/// not index logs per block reliably, so when nothing is found there the
/// range down to `start_height` is scanned backwards for the event carrying
/// the stored nonce.
pub(crate) async fn latest_eth_valset(
    bridge: &dyn BridgeContract,
    start_height: u64,
    blocks_to_search: u64,
) -> ChainResult<Option<Valset>> {
    let height = bridge.state_last_valset_height().await?;
    let mut events = bridge.filter_valset_updated(height, height).await?;

    if events.is_empty() {
        let nonce = bridge.state_last_valset_nonce().await?;
        let head = bridge.latest_block().await?;
        debug!(height, nonce, head, "No valset event at the stored height, scanning");
        let mut end = head;
        while end >= start_height {
            let start = end.saturating_sub(blocks_to_search).max(start_height);
            events = bridge.filter_valset_updated(start, end).await?;
            events.retain(|event| event.valset_nonce == nonce);
            if !events.is_empty() || start == start_height {
                break;
            }
            end = start - 1;
        }
    }

    events.sort_by(|a, b| b.valset_nonce.cmp(&a.valset_nonce));
    Ok(events.first().map(|event| event.to_valset()))
}

/// Keeps the contract valset in step with the home chain.
#[derive(Debug)]
pub struct ValsetManager {
    instance: Arc<HyperionInstance>,
}

impl ValsetManager {
    pub fn new(instance: Arc<HyperionInstance>) -> Self {
        Self { instance }
    }

    /// Compare the contract checkpoint with the locally computed one and
    /// publish the outcome in the instance state.
    async fn sync_eth_valset(&self) -> ChainResult<Option<Valset>> {
        let instance = &self.instance;
        let bridge = instance.bridge();
        let start_height = instance.params().bridge_contract_start_height;
        let blocks_to_search = instance.conf().blocks_to_search;
        let eth_valset = instance
            .read("latest_eth_valset", || {
                latest_eth_valset(bridge.as_ref(), start_height, blocks_to_search)
            })
            .await?;
        let checkpoint = instance
            .read("state_last_valset_checkpoint", || {
                bridge.state_last_valset_checkpoint()
            })
            .await?;

        let synced = eth_valset
            .filter(|valset| valset_checkpoint(instance.hyperion_id(), valset) == checkpoint);
        match &synced {
            Some(valset) => debug!(nonce = valset.nonce, ?checkpoint, "Contract valset in sync"),
            None => warn!(?checkpoint, "Contract checkpoint does not match its last valset event"),
        }
        instance.state().set_synced(synced.is_some());
        instance.state().set_eth_valset(synced.clone());
        Ok(synced)
    }

    /// Newest home valset that has confirmations.
    async fn confirmed_valset(&self) -> ChainResult<Option<(Valset, Vec<ValsetConfirm>)>> {
        let instance = &self.instance;
        let home = instance.home();
        let hyperion_id = instance.hyperion_id();
        let valsets = instance
            .read("latest_valsets", || home.latest_valsets(hyperion_id))
            .await?;
        for valset in valsets {
            let confirms = instance
                .read("valset_confirms", || home.valset_confirms(hyperion_id, valset.nonce))
                .await?;
            if !confirms.is_empty() {
                return Ok(Some((valset, confirms)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl OrchestratorLoop for ValsetManager {
    fn kind(&self) -> LoopKind {
        LoopKind::ValsetManager
    }

    fn interval(&self) -> Duration {
        self.instance.conf().valset_manager_loop_duration
    }

    #[instrument(skip(self))]
    async fn tick(&mut self) -> ChainResult<()> {
        let instance = self.instance.clone();
        let state = instance.state();
        let eth_valset = self.sync_eth_valset().await?;

        let Some((confirmed, confirms)) = self.confirmed_valset().await? else {
            debug!("No confirmed home valset");
            return Ok(());
        };

        let contract_nonce = instance
            .read("state_last_valset_nonce", || {
                instance.bridge().state_last_valset_nonce()
            })
            .await?;
        if confirmed.nonce <= contract_nonce {
            state.set_considered_synced(true);
            return Ok(());
        }

        let created_at = instance
            .read("block_time", || instance.home().block_time(confirmed.height))
            .await?;
        let age = SystemTime::now()
            .duration_since(created_at)
            .unwrap_or_default();
        if age < instance.conf().valset_offset {
            debug!(nonce = confirmed.nonce, ?age, "Valset not old enough to relay");
            state.set_considered_synced(true);
            return Ok(());
        }
        state.set_considered_synced(false);

        let Some(eth_valset) = eth_valset else {
            warn!(
                nonce = confirmed.nonce,
                "Contract valset unknown, can not relay valset update"
            );
            return Ok(());
        };

        info!(
            from = eth_valset.nonce,
            to = confirmed.nonce,
            confirms = confirms.len(),
            "Relaying valset update"
        );
        let outcome = match instance
            .bridge()
            .update_valset(&eth_valset, &confirmed, &confirms)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.is_insufficient_funds() {
                    state.set_error_status(err.to_string());
                }
                return Err(err);
            }
        };
        info!(tx_hash = ?outcome.tx_hash, nonce = confirmed.nonce, "Valset updated");
        state.clear_error_status();
        instance
            .record_submission(
                FeeKind::Valset,
                &outcome,
                confirmed.reward_token,
                confirmed.reward_amount,
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockall::Sequence;

    use hyperion_core::test_utils::valset;
    use hyperion_core::{
        ChainCommunicationError, RetryPolicy, ValsetMember, ValsetUpdatedEvent, H256,
    };

    use super::*;
    use crate::test_utils::{aged, tx_outcome, MockBridge, MockHome, TestInstance};

    fn updated_event(valset: &Valset, block_height: u64) -> ValsetUpdatedEvent {
        ValsetUpdatedEvent {
            valset_nonce: valset.nonce,
            validators: valset.validators(),
            powers: valset.members.iter().map(|m| m.power).collect(),
            reward_amount: valset.reward_amount,
            reward_token: valset.reward_token,
            event_nonce: valset.nonce + 10,
            block_height,
            tx_hash: H256::zero(),
        }
    }

    /// The home valset 2 reverses the members and powers of valset 1.
    fn reversed(old: &Valset) -> Valset {
        let members = old
            .members
            .iter()
            .rev()
            .zip(old.members.iter())
            .map(|(member, power_of)| ValsetMember::new(member.eth_address, power_of.power))
            .collect();
        Valset {
            nonce: 2,
            height: 20,
            members,
            ..Default::default()
        }
    }

    fn confirm(nonce: u64, member: &ValsetMember) -> ValsetConfirm {
        ValsetConfirm {
            nonce,
            orchestrator: "helios1member".into(),
            eth_address: member.eth_address,
            signature: "00".repeat(65),
        }
    }

    fn synced_bridge(old: &Valset) -> MockBridge {
        let mut bridge = MockBridge::new();
        let event = updated_event(old, 150);
        let checkpoint = valset_checkpoint(1, old);
        bridge.expect_state_last_valset_height().returning(|| Ok(150));
        bridge
            .expect_filter_valset_updated()
            .returning(move |_, _| Ok(vec![event.clone()]));
        bridge
            .expect_state_last_valset_checkpoint()
            .returning(move || Ok(checkpoint));
        bridge.expect_state_last_valset_nonce().returning(|| Ok(1));
        bridge
    }

    #[tokio::test]
    async fn relays_newer_confirmed_valset() {
        let old = valset(1, 3);
        let new = reversed(&old);
        let confirms: Vec<_> = new.members[..2].iter().map(|m| confirm(2, m)).collect();

        let mut bridge = synced_bridge(&old);
        let (old_members, expected_new) = (old.members.clone(), new.clone());
        bridge
            .expect_update_valset()
            .withf(move |old, new, confirms| {
                old.nonce == 1
                    && old.members == old_members
                    && new == &expected_new
                    && confirms.len() == 2
            })
            .times(1)
            .returning(|_, _, _| Ok(tx_outcome()));
        bridge.expect_latest_block().returning(|| Ok(500));

        let mut home = MockHome::new();
        let latest = new.clone();
        home.expect_latest_valsets()
            .returning(move |_| Ok(vec![latest.clone()]));
        home.expect_valset_confirms()
            .returning(move |_, _| Ok(confirms.clone()));
        home.expect_block_time()
            .returning(|_| Ok(aged(Duration::from_secs(600))));

        let instance = TestInstance::with(home, bridge)
            .conf(|conf| conf.valset_offset = Duration::from_secs(300))
            .build();
        ValsetManager::new(instance.clone()).tick().await.unwrap();

        let state = instance.state();
        assert!(state.is_synced());
        assert_eq!(state.eth_valset().map(|v| v.members), Some(old.members));
        assert_eq!(state.counter("valset_relayed"), 1);
        let fees = instance.data_dir().fees(Some(97)).unwrap();
        assert_eq!(fees.len(), 1);
    }

    #[tokio::test]
    async fn young_valsets_wait_for_the_offset() {
        let old = valset(1, 3);
        let new = reversed(&old);
        let mut bridge = synced_bridge(&old);
        bridge.expect_update_valset().never();

        let mut home = MockHome::new();
        home.expect_latest_valsets()
            .returning(move |_| Ok(vec![new.clone()]));
        home.expect_valset_confirms()
            .returning(|_, _| Ok(vec![confirm(2, &ValsetMember::new(Default::default(), 1))]));
        home.expect_block_time()
            .returning(|_| Ok(aged(Duration::from_secs(10))));

        let instance = TestInstance::with(home, bridge)
            .conf(|conf| conf.valset_offset = Duration::from_secs(300))
            .build();
        ValsetManager::new(instance.clone()).tick().await.unwrap();
        assert!(instance.state().snapshot().considered_synced);
    }

    #[tokio::test]
    async fn checkpoint_mismatch_clears_eth_valset() {
        let old = valset(1, 3);
        let mut bridge = MockBridge::new();
        let event = updated_event(&old, 150);
        bridge.expect_state_last_valset_height().returning(|| Ok(150));
        bridge
            .expect_filter_valset_updated()
            .returning(move |_, _| Ok(vec![event.clone()]));
        bridge
            .expect_state_last_valset_checkpoint()
            .returning(|| Ok(H256::repeat_byte(0xee)));
        bridge.expect_update_valset().never();

        let mut home = MockHome::new();
        home.expect_latest_valsets().returning(|_| Ok(vec![]));

        let instance = TestInstance::with(home, bridge).build();
        ValsetManager::new(instance.clone()).tick().await.unwrap();
        assert!(!instance.state().is_synced());
        assert_eq!(instance.state().eth_valset(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn pruned_checkpoint_read_moves_to_another_endpoint() {
        let old = valset(1, 3);
        let event = updated_event(&old, 150);
        let checkpoint = valset_checkpoint(1, &old);
        let mut bridge = MockBridge::new();
        bridge.expect_state_last_valset_height().returning(|| Ok(150));
        bridge
            .expect_filter_valset_updated()
            .returning(move |_, _| Ok(vec![event.clone()]));
        let mut seq = Sequence::new();
        bridge
            .expect_state_last_valset_checkpoint()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Err(ChainCommunicationError::CustomError(
                    "missing trie node".into(),
                ))
            });
        bridge
            .expect_rotate_endpoint()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        bridge
            .expect_state_last_valset_checkpoint()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move || Ok(checkpoint));

        let mut home = MockHome::new();
        home.expect_latest_valsets().returning(|_| Ok(vec![]));

        let instance = TestInstance::with(home, bridge)
            .conf(|conf| conf.read_retry = RetryPolicy::new(2, Duration::from_secs(1)))
            .build();
        ValsetManager::new(instance.clone()).tick().await.unwrap();
        assert!(instance.state().is_synced());
    }

    #[tokio::test]
    async fn insufficient_funds_sets_error_status() {
        let old = valset(1, 3);
        let new = reversed(&old);
        let mut bridge = synced_bridge(&old);
        bridge.expect_update_valset().returning(|_, _, _| {
            Err(ChainCommunicationError::InsufficientFunds("balance 0".into()))
        });

        let mut home = MockHome::new();
        home.expect_latest_valsets()
            .returning(move |_| Ok(vec![new.clone()]));
        home.expect_valset_confirms()
            .returning(|_, _| Ok(vec![confirm(2, &ValsetMember::new(Default::default(), 1))]));
        home.expect_block_time()
            .returning(|_| Ok(aged(Duration::from_secs(600))));

        let instance = TestInstance::with(home, bridge).build();
        assert!(ValsetManager::new(instance.clone()).tick().await.is_err());
        assert!(instance.state().error_status().is_some());
    }

    #[tokio::test]
    async fn scans_back_when_stored_height_has_no_event() {
        let target = valset(3, 2);
        let event = updated_event(&target, 1_200);
        let mut bridge = MockBridge::new();
        bridge.expect_state_last_valset_height().returning(|| Ok(1_200));
        bridge.expect_state_last_valset_nonce().returning(|| Ok(3));
        bridge.expect_latest_block().returning(|| Ok(5_000));
        bridge
            .expect_filter_valset_updated()
            .returning(move |start, end| {
                if start <= 1_200 && 1_200 <= end && start != end {
                    Ok(vec![event.clone()])
                } else {
                    Ok(vec![])
                }
            });

        let found = latest_eth_valset(&bridge, 100, 2_000).await.unwrap();
        assert_eq!(found.map(|v| v.nonce), Some(3));
    }
}
