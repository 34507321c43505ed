use std::time::SystemTime;

use async_trait::async_trait;
use cosmrs::proto::cosmos::tx::v1beta1::TxRaw;
use cosmrs::tx::{self, Fee, ModeInfo, SignDoc, SignMode, SignerInfo, SignerPublicKey};
use cosmrs::{Any, Coin};
use prost::Message;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use hyperion_core::{
    BatchConfirm, BridgeEvent, ChainCommunicationError, ChainResult, ExternalCallTx,
    ExternalDataClaim, HomeChain, HomeTxResponse, HyperionId, HyperionParams, LastClaimEvent,
    OutgoingBatch, SignedDigest, SkippedTx, TokenFees, Valset, ValsetConfirm, H160,
};

use crate::convert::{self, fmt_address};
use crate::proto::{self, query_path, to_any};
use crate::{ConnectionConf, HeliosError, HeliosProvider, HeliosSigner};

/// ABCI code of a wrong account sequence.
pub const SEQUENCE_MISMATCH_CODE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AccountState {
    account_number: u64,
    sequence: u64,
}

/// Client of the hyperion module on the home chain.
///
/// Every broadcast holds the account lock from sequence lookup until the
/// node answered, so concurrent loops never reuse a sequence.
#[derive(Debug)]
pub struct HeliosClient {
    provider: HeliosProvider,
    conf: ConnectionConf,
    signer: HeliosSigner,
    account: Mutex<Option<AccountState>>,
}

impl HeliosClient {
    /// Connect to the configured endpoints.
    pub fn new(conf: ConnectionConf, signer: HeliosSigner) -> ChainResult<Self> {
        let provider = HeliosProvider::new(&conf)?;
        Ok(Self {
            provider,
            conf,
            signer,
            account: Mutex::new(None),
        })
    }

    /// The read side of the client.
    pub fn provider(&self) -> &HeliosProvider {
        &self.provider
    }

    /// The connection config.
    pub fn conf(&self) -> &ConnectionConf {
        &self.conf
    }

    /// Sign and broadcast `msgs` in one transaction.
    #[instrument(skip(self, msgs), fields(msgs = msgs.len(), sender = %self.signer.address()))]
    pub async fn broadcast(&self, msgs: Vec<Any>) -> ChainResult<HomeTxResponse> {
        let mut account = self.account.lock().await;
        let state = match *account {
            Some(state) => state,
            None => {
                let base = self.provider.account(self.signer.address()).await?;
                debug!(
                    account_number = base.account_number,
                    sequence = base.sequence,
                    "Loaded home chain account"
                );
                AccountState {
                    account_number: base.account_number,
                    sequence: base.sequence,
                }
            }
        };

        let result = self.sign_and_broadcast(msgs, state).await;
        *account = match &result {
            Ok(_) => Some(AccountState {
                sequence: state.sequence + 1,
                ..state
            }),
            // rejected in CheckTx, the sequence was not consumed
            Err(ChainCommunicationError::HomeChainTx { .. }) => Some(state),
            Err(error) => {
                warn!(?error, "Dropping cached account sequence");
                None
            }
        };
        result
    }

    async fn sign_and_broadcast(
        &self,
        msgs: Vec<Any>,
        state: AccountState,
    ) -> ChainResult<HomeTxResponse> {
        let simulated = self.sign_doc(msgs.clone(), state, 0)?;
        let raw = TxRaw {
            body_bytes: simulated.body_bytes,
            auth_info_bytes: simulated.auth_info_bytes,
            signatures: vec![vec![]],
        };
        let gas_used = self.provider.simulate(raw.encode_to_vec()).await?;
        let gas_limit = (gas_used as f64 * self.conf.gas_adjustment()).ceil() as u64;

        let sign_doc = self.sign_doc(msgs, state, gas_limit)?;
        let sign_bytes = sign_doc.clone().into_bytes().map_err(HeliosError::from)?;
        let signature = self.signer.sign(&sign_bytes)?;
        let raw = TxRaw {
            body_bytes: sign_doc.body_bytes,
            auth_info_bytes: sign_doc.auth_info_bytes,
            signatures: vec![signature],
        };

        let response = self.provider.broadcast_sync(raw.encode_to_vec()).await?;
        check_tx_code(response.code.value(), &response.codespace, &response.log)?;
        info!(tx_hash = %response.hash, gas_limit, sequence = state.sequence, "Broadcast home chain tx");
        Ok(HomeTxResponse {
            tx_hash: response.hash.to_string(),
            height: None,
            gas_used: gas_limit,
        })
    }

    fn sign_doc(&self, msgs: Vec<Any>, state: AccountState, gas_limit: u64) -> ChainResult<SignDoc> {
        let body = tx::Body::new(msgs, String::default(), 0u32);
        let signer_info = SignerInfo {
            public_key: Some(SignerPublicKey::Any(self.signer.public_key_any())),
            mode_info: ModeInfo::single(SignMode::Direct),
            sequence: state.sequence,
        };
        let fee_coin = Coin::new(self.conf.fee_amount(gas_limit), self.conf.fee_denom())
            .map_err(HeliosError::from)?;
        let auth_info = signer_info.auth_info(Fee::from_amount_and_gas(fee_coin, gas_limit));
        let chain_id = self
            .conf
            .chain_id()
            .parse::<tendermint::chain::Id>()
            .map_err(HeliosError::from)?;
        Ok(SignDoc::new(&body, &auth_info, &chain_id, state.account_number)
            .map_err(HeliosError::from)?)
    }

    /// Home chain address of the signer.
    pub fn address(&self) -> String {
        self.signer.address()
    }

    pub(crate) fn signer(&self) -> &HeliosSigner {
        &self.signer
    }
}

/// Map a CheckTx result code to an error class.
pub fn check_tx_code(code: u32, codespace: &str, log: &str) -> ChainResult<()> {
    if code == 0 {
        return Ok(());
    }
    if code == SEQUENCE_MISMATCH_CODE || log.contains("account sequence mismatch") {
        return Err(ChainCommunicationError::AccountSequenceMismatch(log.to_owned()));
    }
    Err(ChainCommunicationError::HomeChainTx {
        code,
        codespace: codespace.to_owned(),
        log: log.to_owned(),
    })
}

#[async_trait]
impl HomeChain for HeliosClient {
    fn orchestrator_address(&self) -> String {
        self.signer.address()
    }

    fn eth_address(&self) -> H160 {
        self.signer.eth_address()
    }

    async fn params(&self) -> ChainResult<HyperionParams> {
        let response: proto::QueryParamsResponse = self
            .provider
            .abci_query(&query_path("Params"), proto::QueryParamsRequest {})
            .await?;
        convert::params_from_proto(response.params.unwrap_or_default())
    }

    async fn latest_block_height(&self) -> ChainResult<u64> {
        self.provider.latest_height().await
    }

    async fn block_time(&self, height: u64) -> ChainResult<SystemTime> {
        self.provider.block_time(height).await
    }

    async fn last_claim_event(&self, hyperion_id: HyperionId) -> ChainResult<LastClaimEvent> {
        let response: proto::QueryLastEventByAddrResponse = self
            .provider
            .abci_query(
                &query_path("LastEventByAddr"),
                proto::QueryByAddrRequest {
                    address: self.signer.address(),
                    hyperion_id,
                },
            )
            .await?;
        Ok(convert::last_claim_from_proto(response.last_claim_event))
    }

    async fn oldest_unsigned_valsets(&self, hyperion_id: HyperionId) -> ChainResult<Vec<Valset>> {
        let response: proto::QueryValsetsResponse = self
            .provider
            .abci_query(
                &query_path("LastPendingValsetRequestByAddr"),
                proto::QueryByAddrRequest {
                    address: self.signer.address(),
                    hyperion_id,
                },
            )
            .await?;
        response
            .valsets
            .into_iter()
            .map(convert::valset_from_proto)
            .collect()
    }

    async fn oldest_unsigned_batch(
        &self,
        hyperion_id: HyperionId,
    ) -> ChainResult<Option<OutgoingBatch>> {
        let response: proto::QueryLastPendingBatchRequestByAddrResponse = self
            .provider
            .abci_query(
                &query_path("LastPendingBatchRequestByAddr"),
                proto::QueryByAddrRequest {
                    address: self.signer.address(),
                    hyperion_id,
                },
            )
            .await?;
        response.batch.map(convert::batch_from_proto).transpose()
    }

    async fn latest_valsets(&self, hyperion_id: HyperionId) -> ChainResult<Vec<Valset>> {
        let response: proto::QueryValsetsResponse = self
            .provider
            .abci_query(
                &query_path("LastValsetRequests"),
                proto::QueryByHyperionIdRequest { hyperion_id },
            )
            .await?;
        response
            .valsets
            .into_iter()
            .map(convert::valset_from_proto)
            .collect()
    }

    async fn current_valset(&self, hyperion_id: HyperionId) -> ChainResult<Valset> {
        let response: proto::QueryCurrentValsetResponse = self
            .provider
            .abci_query(
                &query_path("CurrentValset"),
                proto::QueryByHyperionIdRequest { hyperion_id },
            )
            .await?;
        let valset = response.valset.ok_or(HeliosError::MissingField("valset"))?;
        convert::valset_from_proto(valset)
    }

    async fn valset_confirms(
        &self,
        hyperion_id: HyperionId,
        nonce: u64,
    ) -> ChainResult<Vec<ValsetConfirm>> {
        let response: proto::QueryValsetConfirmsByNonceResponse = self
            .provider
            .abci_query(
                &query_path("ValsetConfirmsByNonce"),
                proto::QueryValsetConfirmsByNonceRequest { nonce, hyperion_id },
            )
            .await?;
        response
            .confirms
            .into_iter()
            .map(convert::valset_confirm_from_proto)
            .collect()
    }

    async fn latest_transaction_batches(
        &self,
        hyperion_id: HyperionId,
    ) -> ChainResult<Vec<OutgoingBatch>> {
        let response: proto::QueryOutgoingTxBatchesResponse = self
            .provider
            .abci_query(
                &query_path("OutgoingTxBatches"),
                proto::QueryByHyperionIdRequest { hyperion_id },
            )
            .await?;
        response
            .batches
            .into_iter()
            .map(convert::batch_from_proto)
            .collect()
    }

    async fn batch_confirms(
        &self,
        hyperion_id: HyperionId,
        nonce: u64,
        token: H160,
    ) -> ChainResult<Vec<BatchConfirm>> {
        let response: proto::QueryBatchConfirmsResponse = self
            .provider
            .abci_query(
                &query_path("BatchConfirms"),
                proto::QueryBatchConfirmsRequest {
                    nonce,
                    contract_address: fmt_address(&token),
                    hyperion_id,
                },
            )
            .await?;
        response
            .confirms
            .into_iter()
            .map(convert::batch_confirm_from_proto)
            .collect()
    }

    async fn unbatched_tokens_with_fees(
        &self,
        hyperion_id: HyperionId,
    ) -> ChainResult<Vec<TokenFees>> {
        let response: proto::QueryBatchFeeResponse = self
            .provider
            .abci_query(
                &query_path("BatchFees"),
                proto::QueryByHyperionIdRequest { hyperion_id },
            )
            .await?;
        response
            .batch_fees
            .into_iter()
            .map(convert::token_fees_from_proto)
            .collect()
    }

    async fn token_to_denom(&self, hyperion_id: HyperionId, token: H160) -> ChainResult<String> {
        let response: proto::QueryErc20ToDenomResponse = self
            .provider
            .abci_query(
                &query_path("ERC20ToDenom"),
                proto::QueryErc20ToDenomRequest {
                    erc20: fmt_address(&token),
                    hyperion_id,
                },
            )
            .await?;
        Ok(response.denom)
    }

    async fn external_call_txs(&self, hyperion_id: HyperionId) -> ChainResult<Vec<ExternalCallTx>> {
        let response: proto::QueryOutgoingExternalDataTxsResponse = self
            .provider
            .abci_query(
                &query_path("OutgoingExternalDataTxs"),
                proto::QueryByHyperionIdRequest { hyperion_id },
            )
            .await?;
        response
            .txs
            .into_iter()
            .map(convert::external_tx_from_proto)
            .collect()
    }

    async fn skipped_txs(&self, hyperion_id: HyperionId) -> ChainResult<Vec<SkippedTx>> {
        let response: proto::QuerySkippedTxsResponse = self
            .provider
            .abci_query(
                &query_path("SkippedTxs"),
                proto::QueryByHyperionIdRequest { hyperion_id },
            )
            .await?;
        Ok(response
            .skipped_txs
            .into_iter()
            .map(convert::skipped_from_proto)
            .collect())
    }

    #[instrument(skip(self, events), fields(events = events.len()))]
    async fn send_claims(
        &self,
        hyperion_id: HyperionId,
        events: &[BridgeEvent],
    ) -> ChainResult<HomeTxResponse> {
        let orchestrator = self.signer.address();
        let msgs = events
            .iter()
            .map(|event| convert::claim_to_any(hyperion_id, &orchestrator, self.conf.prefix(), event))
            .collect();
        self.broadcast(msgs).await
    }

    async fn simulate_external_data_claim(&self, claim: &ExternalDataClaim) -> ChainResult<()> {
        let msg = to_any(&convert::external_claim_to_proto(claim, &self.signer.address()));
        let state = {
            let account = self.account.lock().await;
            *account
        };
        let state = match state {
            Some(state) => state,
            None => {
                let base = self.provider.account(self.signer.address()).await?;
                AccountState {
                    account_number: base.account_number,
                    sequence: base.sequence,
                }
            }
        };
        let sign_doc = self.sign_doc(vec![msg], state, 0)?;
        let raw = TxRaw {
            body_bytes: sign_doc.body_bytes,
            auth_info_bytes: sign_doc.auth_info_bytes,
            signatures: vec![vec![]],
        };
        self.provider.simulate(raw.encode_to_vec()).await.map(|_| ())
    }

    #[instrument(skip(self, claims), fields(claims = claims.len()))]
    async fn send_external_data_claims(
        &self,
        claims: &[ExternalDataClaim],
    ) -> ChainResult<HomeTxResponse> {
        let orchestrator = self.signer.address();
        let msgs = claims
            .iter()
            .map(|claim| to_any(&convert::external_claim_to_proto(claim, &orchestrator)))
            .collect();
        self.broadcast(msgs).await
    }

    #[instrument(skip(self, signed))]
    async fn send_valset_confirm(
        &self,
        hyperion_id: HyperionId,
        nonce: u64,
        signed: &SignedDigest,
    ) -> ChainResult<HomeTxResponse> {
        let msg = proto::MsgValsetConfirm {
            nonce,
            orchestrator: self.signer.address(),
            eth_address: fmt_address(&signed.eth_address),
            signature: hex::encode(&signed.signature),
            hyperion_id,
        };
        self.broadcast(vec![to_any(&msg)]).await
    }

    #[instrument(skip(self, batch, signed), fields(batch_nonce = batch.batch_nonce, token = ?batch.token_contract))]
    async fn send_batch_confirm(
        &self,
        hyperion_id: HyperionId,
        batch: &OutgoingBatch,
        signed: &SignedDigest,
    ) -> ChainResult<HomeTxResponse> {
        let msg = proto::MsgConfirmBatch {
            nonce: batch.batch_nonce,
            token_contract: fmt_address(&batch.token_contract),
            eth_signer: fmt_address(&signed.eth_address),
            orchestrator: self.signer.address(),
            signature: hex::encode(&signed.signature),
            hyperion_id,
        };
        self.broadcast(vec![to_any(&msg)]).await
    }

    #[instrument(skip(self))]
    async fn request_batch(
        &self,
        hyperion_id: HyperionId,
        denom: &str,
    ) -> ChainResult<HomeTxResponse> {
        let msg = proto::MsgRequestBatch {
            orchestrator: self.signer.address(),
            denom: denom.to_owned(),
            hyperion_id,
        };
        self.broadcast(vec![to_any(&msg)]).await
    }

    async fn reset(&self) {
        *self.account.lock().await = None;
        debug!("Reset home chain account sequence");
    }
}
