use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use hyperion_core::{ChainCommunicationError, ChainResult, ExternalCallTx, ExternalDataClaim};

use crate::instance::{HyperionInstance, LoopKind, OrchestratorLoop, EXTERNAL_DATA_BULK_SIZE};

/// Answers external call requests of the home chain with the result of the
/// call on the counterparty chain.
#[derive(Debug)]
pub struct ExternalDataRelayer {
    instance: Arc<HyperionInstance>,
}

impl ExternalDataRelayer {
    pub fn new(instance: Arc<HyperionInstance>) -> Self {
        Self { instance }
    }

    /// Execute the call of `tx` at the height other relayers agreed on, or at
    /// `head` when nobody claimed yet.
    async fn claim_for(&self, tx: &ExternalCallTx, head: u64) -> ChainResult<ExternalDataClaim> {
        let target_height = tx
            .dominant_claim()
            .map(|claim| claim.block_height)
            .unwrap_or(head);
        let calldata = tx
            .calldata()
            .map_err(|e| ChainCommunicationError::ParseError(format!("abi_call_hex: {e}")))?;
        let outcome = self
            .instance
            .bridge()
            .call_at(tx.external_contract_address, calldata, target_height)
            .await?;
        Ok(ExternalDataClaim {
            hyperion_id: self.instance.hyperion_id(),
            tx_nonce: tx.nonce,
            block_height: target_height,
            external_contract_address: tx.external_contract_address,
            call_data_result: outcome.data,
            call_data_result_error: outcome.error,
            rpc_used: outcome.rpc_used,
        })
    }

    async fn flush(&self, claims: &mut Vec<ExternalDataClaim>) -> ChainResult<()> {
        if claims.is_empty() {
            return Ok(());
        }
        let result = self
            .instance
            .home()
            .send_external_data_claims(&claims[..])
            .await;
        let response = self.instance.checked_broadcast(result).await?;
        info!(claims = claims.len(), tx_hash = %response.tx_hash, "Sent external data claims");
        self.instance
            .state()
            .add("external_data", claims.len() as u64);
        claims.clear();
        Ok(())
    }
}

#[async_trait]
impl OrchestratorLoop for ExternalDataRelayer {
    fn kind(&self) -> LoopKind {
        LoopKind::ExternalData
    }

    fn interval(&self) -> Duration {
        self.instance.conf().loop_duration
    }

    #[instrument(skip(self))]
    async fn tick(&mut self) -> ChainResult<()> {
        let instance = self.instance.clone();
        let me = instance.home().orchestrator_address();
        let pending: Vec<_> = instance
            .home()
            .external_call_txs(instance.hyperion_id())
            .await?
            .into_iter()
            .filter(|tx| !tx.has_voted(&me))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        let head = instance.bridge().latest_block().await?;

        let mut buffer = Vec::with_capacity(EXTERNAL_DATA_BULK_SIZE);
        for tx in &pending {
            let claim = match self.claim_for(tx, head).await {
                Ok(claim) => claim,
                Err(err) => {
                    warn!(nonce = tx.nonce, ?err, "Could not execute external call");
                    continue;
                }
            };
            if let Err(err) = instance.home().simulate_external_data_claim(&claim).await {
                warn!(nonce = tx.nonce, ?err, "External data claim failed simulation");
                continue;
            }
            debug!(nonce = tx.nonce, height = claim.block_height, "Buffered external data claim");
            buffer.push(claim);
            if buffer.len() >= EXTERNAL_DATA_BULK_SIZE {
                self.flush(&mut buffer).await?;
            }
        }
        self.flush(&mut buffer).await
    }
}

#[cfg(test)]
mod tests {
    use hyperion_core::{CallOutcome, ExternalDataClaimRecord, H160};

    use super::*;
    use crate::test_utils::{tx_response, MockBridge, MockHome, TestInstance, TEST_ORCHESTRATOR};

    fn call_tx(nonce: u64, votes: Vec<String>, claims: Vec<ExternalDataClaimRecord>) -> ExternalCallTx {
        ExternalCallTx {
            hyperion_id: 1,
            nonce,
            external_contract_address: H160::repeat_byte(0xec),
            abi_call_hex: "0x313ce567".into(),
            votes,
            claims,
        }
    }

    fn record(height: u64) -> ExternalDataClaimRecord {
        ExternalDataClaimRecord {
            tx_nonce: 2,
            block_height: height,
            call_data_result: vec![18],
            call_data_result_error: String::new(),
        }
    }

    fn answering_bridge() -> MockBridge {
        let mut bridge = MockBridge::new();
        bridge.expect_latest_block().returning(|| Ok(1_000));
        bridge.expect_call_at().returning(|_, data, _| {
            assert_eq!(data, vec![0x31, 0x3c, 0xe5, 0x67]);
            Ok(CallOutcome {
                data: vec![18],
                error: String::new(),
                rpc_used: "http://rpc".into(),
            })
        });
        bridge
    }

    #[tokio::test]
    async fn claims_unvoted_calls_at_the_agreed_height() {
        let mut home = MockHome::new();
        home.expect_orchestrator_address()
            .return_const(TEST_ORCHESTRATOR.to_owned());
        home.expect_external_call_txs().returning(|_| {
            Ok(vec![
                call_tx(1, vec![TEST_ORCHESTRATOR.into()], vec![]),
                call_tx(2, vec!["helios1other".into()], vec![record(900), record(900), record(950)]),
                call_tx(3, vec![], vec![]),
            ])
        });
        home.expect_simulate_external_data_claim().returning(|_| Ok(()));
        home.expect_send_external_data_claims()
            .withf(|claims| {
                claims.len() == 2
                    && (claims[0].tx_nonce, claims[0].block_height) == (2, 900)
                    && (claims[1].tx_nonce, claims[1].block_height) == (3, 1_000)
                    && claims[1].rpc_used == "http://rpc"
            })
            .times(1)
            .returning(|_| Ok(tx_response()));

        let instance = TestInstance::with(home, answering_bridge()).build();
        ExternalDataRelayer::new(instance.clone()).tick().await.unwrap();
        assert_eq!(instance.state().counter("external_data"), 2);
    }

    #[tokio::test]
    async fn flushes_every_ten_claims_and_drops_failed_simulations() {
        let mut home = MockHome::new();
        home.expect_orchestrator_address()
            .return_const(TEST_ORCHESTRATOR.to_owned());
        home.expect_external_call_txs()
            .returning(|_| Ok((1..=12).map(|nonce| call_tx(nonce, vec![], vec![])).collect()));
        home.expect_simulate_external_data_claim().returning(|claim| {
            if claim.tx_nonce == 12 {
                Err(ChainCommunicationError::CustomError("already claimed".into()))
            } else {
                Ok(())
            }
        });
        let mut seq = mockall::Sequence::new();
        home.expect_send_external_data_claims()
            .withf(|claims| claims.len() == 10)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(tx_response()));
        home.expect_send_external_data_claims()
            .withf(|claims| claims.len() == 1 && claims[0].tx_nonce == 11)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(tx_response()));

        let instance = TestInstance::with(home, answering_bridge()).build();
        ExternalDataRelayer::new(instance).tick().await.unwrap();
    }
}
