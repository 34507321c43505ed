use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use hyperion_core::encode::{encode_batch_confirm, encode_valset_confirm};
use hyperion_core::{ChainResult, EthSignerExt};

use crate::instance::{HyperionInstance, LoopKind, OrchestratorLoop};

/// Confirms valsets and batches the home chain is waiting on this signer for.
#[derive(Debug)]
pub struct Signer {
    instance: Arc<HyperionInstance>,
}

impl Signer {
    pub fn new(instance: Arc<HyperionInstance>) -> Self {
        Self { instance }
    }

    fn count(&self, kind: &str) {
        self.instance
            .metrics()
            .confirms_signed()
            .with_label_values(&[self.instance.chain_label().as_str(), kind])
            .inc();
        self.instance.state().add(&format!("{kind}_confirms"), 1);
    }

    async fn sign_valsets(&self) -> ChainResult<()> {
        let instance = &self.instance;
        let hyperion_id = instance.hyperion_id();
        for valset in instance.home().oldest_unsigned_valsets(hyperion_id).await? {
            let digest = encode_valset_confirm(hyperion_id, &valset);
            let signed = instance.signer().sign_digest(digest).await?;
            let result = instance
                .home()
                .send_valset_confirm(hyperion_id, valset.nonce, &signed)
                .await;
            let response = instance.checked_broadcast(result).await?;
            info!(nonce = valset.nonce, ?digest, tx_hash = %response.tx_hash, "Confirmed valset");
            self.count("valset");
        }
        Ok(())
    }

    async fn sign_batch(&self) -> ChainResult<()> {
        let instance = &self.instance;
        let hyperion_id = instance.hyperion_id();
        let Some(batch) = instance.home().oldest_unsigned_batch(hyperion_id).await? else {
            return Ok(());
        };
        if batch.hyperion_id != hyperion_id {
            debug!(
                batch_hyperion_id = batch.hyperion_id,
                "Unsigned batch belongs to another deployment"
            );
            return Ok(());
        }
        let digest = encode_batch_confirm(hyperion_id, &batch);
        let signed = instance.signer().sign_digest(digest).await?;
        let result = instance
            .home()
            .send_batch_confirm(hyperion_id, &batch, &signed)
            .await;
        let response = instance.checked_broadcast(result).await?;
        info!(
            nonce = batch.batch_nonce,
            token = ?batch.token_contract,
            tx_hash = %response.tx_hash,
            "Confirmed batch"
        );
        self.count("batch");
        Ok(())
    }
}

#[async_trait]
impl OrchestratorLoop for Signer {
    fn kind(&self) -> LoopKind {
        LoopKind::Signer
    }

    fn interval(&self) -> Duration {
        self.instance.conf().loop_duration
    }

    #[instrument(skip(self))]
    async fn tick(&mut self) -> ChainResult<()> {
        self.sign_valsets().await?;
        self.sign_batch().await
    }
}

#[cfg(test)]
mod tests {
    use hyperion_core::test_utils::{address, batch, valset};
    use hyperion_core::{EthSigner, SignedDigest};

    use super::*;
    use crate::test_utils::{test_signer, tx_response, MockBridge, MockHome, TestInstance};

    #[tokio::test]
    async fn signs_every_unsigned_valset_and_the_oldest_batch() {
        let signer = test_signer();
        let valset_digest = encode_valset_confirm(1, &valset(2, 3));
        let batch_digest = encode_batch_confirm(1, &batch(1, 4, address(0xcc)));
        let me = signer.eth_address();

        let mut home = MockHome::new();
        home.expect_oldest_unsigned_valsets()
            .returning(|_| Ok(vec![valset(2, 3)]));
        home.expect_send_valset_confirm()
            .withf(move |hid, nonce, signed: &SignedDigest| {
                *hid == 1 && *nonce == 2 && signed.digest == valset_digest && signed.eth_address == me
            })
            .times(1)
            .returning(|_, _, _| Ok(tx_response()));
        home.expect_oldest_unsigned_batch()
            .returning(|_| Ok(Some(batch(1, 4, address(0xcc)))));
        home.expect_send_batch_confirm()
            .withf(move |_, batch, signed: &SignedDigest| {
                batch.batch_nonce == 4 && signed.digest == batch_digest && signed.signature.len() == 65
            })
            .times(1)
            .returning(|_, _, _| Ok(tx_response()));

        let instance = TestInstance::with(home, MockBridge::new()).build();
        Signer::new(instance.clone()).tick().await.unwrap();
        assert_eq!(instance.state().counter("valset_confirms"), 1);
        assert_eq!(instance.state().counter("batch_confirms"), 1);
    }

    #[tokio::test]
    async fn ignores_batches_of_other_deployments() {
        let mut home = MockHome::new();
        home.expect_oldest_unsigned_valsets().returning(|_| Ok(vec![]));
        home.expect_oldest_unsigned_batch()
            .returning(|_| Ok(Some(batch(9, 4, address(0xcc)))));
        home.expect_send_batch_confirm().never();

        let instance = TestInstance::with(home, MockBridge::new()).build();
        Signer::new(instance).tick().await.unwrap();
    }

    #[tokio::test]
    async fn signing_is_deterministic() {
        let signer = test_signer();
        let digest = encode_valset_confirm(1, &valset(2, 3));
        let first = signer.sign_digest(digest).await.unwrap();
        let second = signer.sign_digest(digest).await.unwrap();
        assert_eq!(first, second);
        assert!(matches!(first.signature[64], 27 | 28));
    }
}
