//! Hand maintained mirror of the `helios.hyperion.v1` protobuf definitions,
//! limited to what the orchestrator reads and broadcasts.

#![allow(missing_docs)]

use cosmrs::proto::cosmos::base::v1beta1::Coin;
use cosmrs::Any;
use prost::{Message, Name};

/// Protobuf package of the hyperion module.
pub const HYPERION_PACKAGE: &str = "helios.hyperion.v1";

/// Pack a message into an `Any` with its canonical type url.
pub fn to_any<M: Message + Name>(msg: &M) -> Any {
    Any {
        type_url: M::type_url(),
        value: msg.encode_to_vec(),
    }
}

/// Full ABCI query path of a hyperion query method.
pub fn query_path(method: &str) -> String {
    format!("/{HYPERION_PACKAGE}.Query/{method}")
}

macro_rules! named {
    ($package:expr => $($ty:ident),+ $(,)?) => {
        $(
            impl Name for $ty {
                const NAME: &'static str = stringify!($ty);
                const PACKAGE: &'static str = $package;
            }
        )+
    };
}

// Shared types

#[derive(Clone, PartialEq, Message)]
pub struct BridgeValidator {
    #[prost(uint64, tag = "1")]
    pub power: u64,
    #[prost(string, tag = "2")]
    pub ethereum_address: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Valset {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(message, repeated, tag = "2")]
    pub members: Vec<BridgeValidator>,
    #[prost(uint64, tag = "3")]
    pub height: u64,
    #[prost(string, tag = "4")]
    pub reward_amount: String,
    #[prost(string, tag = "5")]
    pub reward_token: String,
    #[prost(uint64, tag = "6")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct LastClaimEvent {
    #[prost(uint64, tag = "1")]
    pub ethereum_event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub ethereum_event_height: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Token {
    #[prost(string, tag = "1")]
    pub contract: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct OutgoingTransferTx {
    #[prost(uint64, tag = "1")]
    pub hyperion_id: u64,
    #[prost(uint64, tag = "2")]
    pub id: u64,
    #[prost(string, tag = "3")]
    pub sender: String,
    #[prost(string, tag = "4")]
    pub dest_address: String,
    #[prost(message, optional, tag = "5")]
    pub erc20_token: Option<Token>,
    #[prost(message, optional, tag = "6")]
    pub erc20_fee: Option<Token>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OutgoingTxBatch {
    #[prost(uint64, tag = "1")]
    pub hyperion_id: u64,
    #[prost(uint64, tag = "2")]
    pub batch_nonce: u64,
    #[prost(uint64, tag = "3")]
    pub batch_timeout: u64,
    #[prost(message, repeated, tag = "4")]
    pub transactions: Vec<OutgoingTransferTx>,
    #[prost(string, tag = "5")]
    pub token_contract: String,
    #[prost(uint64, tag = "6")]
    pub block: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct BatchFees {
    #[prost(string, tag = "1")]
    pub token: String,
    #[prost(string, tag = "2")]
    pub total_fees: String,
    #[prost(uint64, tag = "3")]
    pub tx_count: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct CounterpartyChainParams {
    #[prost(uint64, tag = "1")]
    pub hyperion_id: u64,
    #[prost(string, tag = "2")]
    pub bridge_counterparty_address: String,
    #[prost(uint64, tag = "3")]
    pub bridge_chain_id: u64,
    #[prost(string, tag = "4")]
    pub bridge_chain_name: String,
    #[prost(uint64, tag = "5")]
    pub bridge_contract_start_height: u64,
    #[prost(uint64, tag = "6")]
    pub average_counterparty_block_time: u64,
    #[prost(uint64, tag = "7")]
    pub target_batch_timeout: u64,
    /// Zero means the module default
    #[prost(uint64, tag = "8")]
    pub bridge_chain_confirmation_delay: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Params {
    #[prost(message, repeated, tag = "1")]
    pub counterparty_chain_params: Vec<CounterpartyChainParams>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OutgoingExternalDataTx {
    #[prost(uint64, tag = "1")]
    pub hyperion_id: u64,
    #[prost(uint64, tag = "2")]
    pub nonce: u64,
    #[prost(string, tag = "3")]
    pub external_contract_address: String,
    #[prost(string, tag = "4")]
    pub abi_call_hex: String,
    #[prost(string, repeated, tag = "5")]
    pub votes: Vec<String>,
    #[prost(message, repeated, tag = "6")]
    pub claims: Vec<MsgExternalDataClaim>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SkippedTx {
    #[prost(uint64, tag = "1")]
    pub hyperion_id: u64,
    #[prost(uint64, tag = "2")]
    pub nonce: u64,
    #[prost(uint64, tag = "3")]
    pub start_height: u64,
    #[prost(uint64, tag = "4")]
    pub end_height: u64,
}

// Messages

#[derive(Clone, PartialEq, Message)]
pub struct MsgSetOrchestratorAddresses {
    #[prost(string, tag = "1")]
    pub sender: String,
    #[prost(string, tag = "2")]
    pub orchestrator: String,
    #[prost(string, tag = "3")]
    pub eth_address: String,
    #[prost(uint64, tag = "4")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgUnSetOrchestratorAddresses {
    #[prost(string, tag = "1")]
    pub sender: String,
    #[prost(string, tag = "2")]
    pub eth_address: String,
    #[prost(uint64, tag = "3")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgValsetConfirm {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(string, tag = "2")]
    pub orchestrator: String,
    #[prost(string, tag = "3")]
    pub eth_address: String,
    #[prost(string, tag = "4")]
    pub signature: String,
    #[prost(uint64, tag = "5")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgConfirmBatch {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(string, tag = "2")]
    pub token_contract: String,
    #[prost(string, tag = "3")]
    pub eth_signer: String,
    #[prost(string, tag = "4")]
    pub orchestrator: String,
    #[prost(string, tag = "5")]
    pub signature: String,
    #[prost(uint64, tag = "6")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgRequestBatch {
    #[prost(string, tag = "1")]
    pub orchestrator: String,
    #[prost(string, tag = "2")]
    pub denom: String,
    #[prost(uint64, tag = "3")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgDepositClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub block_height: u64,
    #[prost(string, tag = "3")]
    pub token_contract: String,
    #[prost(string, tag = "4")]
    pub amount: String,
    #[prost(string, tag = "5")]
    pub ethereum_sender: String,
    #[prost(string, tag = "6")]
    pub cosmos_receiver: String,
    #[prost(string, tag = "7")]
    pub orchestrator: String,
    #[prost(string, tag = "8")]
    pub data: String,
    #[prost(uint64, tag = "9")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgWithdrawClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub block_height: u64,
    #[prost(uint64, tag = "3")]
    pub batch_nonce: u64,
    #[prost(string, tag = "4")]
    pub token_contract: String,
    #[prost(string, tag = "5")]
    pub orchestrator: String,
    #[prost(uint64, tag = "6")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgValsetUpdatedClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub valset_nonce: u64,
    #[prost(uint64, tag = "3")]
    pub block_height: u64,
    #[prost(message, repeated, tag = "4")]
    pub members: Vec<BridgeValidator>,
    #[prost(string, tag = "5")]
    pub reward_amount: String,
    #[prost(string, tag = "6")]
    pub reward_token: String,
    #[prost(string, tag = "7")]
    pub orchestrator: String,
    #[prost(uint64, tag = "8")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgERC20DeployedClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub block_height: u64,
    #[prost(string, tag = "3")]
    pub cosmos_denom: String,
    #[prost(string, tag = "4")]
    pub token_contract: String,
    #[prost(string, tag = "5")]
    pub name: String,
    #[prost(string, tag = "6")]
    pub symbol: String,
    #[prost(uint64, tag = "7")]
    pub decimals: u64,
    #[prost(string, tag = "8")]
    pub orchestrator: String,
    #[prost(uint64, tag = "9")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgExternalDataClaim {
    #[prost(uint64, tag = "1")]
    pub hyperion_id: u64,
    #[prost(uint64, tag = "2")]
    pub tx_nonce: u64,
    #[prost(uint64, tag = "3")]
    pub block_height: u64,
    #[prost(string, tag = "4")]
    pub external_contract_address: String,
    #[prost(bytes = "vec", tag = "5")]
    pub call_data_result: Vec<u8>,
    #[prost(string, tag = "6")]
    pub call_data_result_error: String,
    #[prost(string, tag = "7")]
    pub orchestrator: String,
    #[prost(string, tag = "8")]
    pub rpc_used: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgForceSetValsetAndLastObservedEventNonce {
    #[prost(string, tag = "1")]
    pub signer: String,
    #[prost(uint64, tag = "2")]
    pub hyperion_id: u64,
    #[prost(message, optional, tag = "3")]
    pub valset: Option<Valset>,
    #[prost(uint64, tag = "4")]
    pub last_observed_event_nonce: u64,
    #[prost(uint64, tag = "5")]
    pub last_observed_ethereum_block_height: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgSendToChain {
    #[prost(string, tag = "1")]
    pub sender: String,
    #[prost(uint64, tag = "2")]
    pub dest_chain_id: u64,
    #[prost(string, tag = "3")]
    pub dest: String,
    #[prost(message, optional, tag = "4")]
    pub amount: Option<Coin>,
    #[prost(message, optional, tag = "5")]
    pub bridge_fee: Option<Coin>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgAddCounterpartyChainParams {
    #[prost(string, tag = "1")]
    pub authority: String,
    #[prost(message, optional, tag = "2")]
    pub counterparty_chain_params: Option<CounterpartyChainParams>,
}

named!(HYPERION_PACKAGE =>
    MsgSetOrchestratorAddresses,
    MsgUnSetOrchestratorAddresses,
    MsgValsetConfirm,
    MsgConfirmBatch,
    MsgRequestBatch,
    MsgDepositClaim,
    MsgWithdrawClaim,
    MsgValsetUpdatedClaim,
    MsgERC20DeployedClaim,
    MsgExternalDataClaim,
    MsgForceSetValsetAndLastObservedEventNonce,
    MsgSendToChain,
    MsgAddCounterpartyChainParams,
);

// Queries

#[derive(Clone, PartialEq, Message)]
pub struct QueryParamsRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct QueryParamsResponse {
    #[prost(message, optional, tag = "1")]
    pub params: Option<Params>,
}

/// Request keyed by orchestrator address and deployment.
#[derive(Clone, PartialEq, Message)]
pub struct QueryByAddrRequest {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(uint64, tag = "2")]
    pub hyperion_id: u64,
}

/// Request keyed by deployment only.
#[derive(Clone, PartialEq, Message)]
pub struct QueryByHyperionIdRequest {
    #[prost(uint64, tag = "1")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryLastEventByAddrResponse {
    #[prost(message, optional, tag = "1")]
    pub last_claim_event: Option<LastClaimEvent>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryValsetsResponse {
    #[prost(message, repeated, tag = "1")]
    pub valsets: Vec<Valset>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryLastPendingBatchRequestByAddrResponse {
    #[prost(message, optional, tag = "1")]
    pub batch: Option<OutgoingTxBatch>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryCurrentValsetResponse {
    #[prost(message, optional, tag = "1")]
    pub valset: Option<Valset>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryValsetConfirmsByNonceRequest {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(uint64, tag = "2")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryValsetConfirmsByNonceResponse {
    #[prost(message, repeated, tag = "1")]
    pub confirms: Vec<MsgValsetConfirm>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryOutgoingTxBatchesResponse {
    #[prost(message, repeated, tag = "1")]
    pub batches: Vec<OutgoingTxBatch>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryBatchConfirmsRequest {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(string, tag = "2")]
    pub contract_address: String,
    #[prost(uint64, tag = "3")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryBatchConfirmsResponse {
    #[prost(message, repeated, tag = "1")]
    pub confirms: Vec<MsgConfirmBatch>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryBatchFeeResponse {
    #[prost(message, repeated, tag = "1")]
    pub batch_fees: Vec<BatchFees>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryErc20ToDenomRequest {
    #[prost(string, tag = "1")]
    pub erc20: String,
    #[prost(uint64, tag = "2")]
    pub hyperion_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryErc20ToDenomResponse {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(bool, tag = "2")]
    pub cosmos_originated: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryOutgoingExternalDataTxsResponse {
    #[prost(message, repeated, tag = "1")]
    pub txs: Vec<OutgoingExternalDataTx>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QuerySkippedTxsResponse {
    #[prost(message, repeated, tag = "1")]
    pub skipped_txs: Vec<SkippedTx>,
}

/// Ethermint style account wrapping a base account.
#[derive(Clone, PartialEq, Message)]
pub struct EthAccount {
    #[prost(message, optional, tag = "1")]
    pub base_account: Option<cosmrs::proto::cosmos::auth::v1beta1::BaseAccount>,
    #[prost(string, tag = "2")]
    pub code_hash: String,
}

/// Governance v1 messages.
pub mod gov {
    use cosmrs::proto::cosmos::base::v1beta1::Coin;
    use cosmrs::Any;
    use prost::{Message, Name};

    /// Protobuf package of the governance module.
    pub const GOV_PACKAGE: &str = "cosmos.gov.v1";

    /// Vote option `yes`.
    pub const VOTE_OPTION_YES: i32 = 1;

    #[derive(Clone, PartialEq, Message)]
    pub struct MsgSubmitProposal {
        #[prost(message, repeated, tag = "1")]
        pub messages: Vec<Any>,
        #[prost(message, repeated, tag = "2")]
        pub initial_deposit: Vec<Coin>,
        #[prost(string, tag = "3")]
        pub proposer: String,
        #[prost(string, tag = "4")]
        pub metadata: String,
        #[prost(string, tag = "5")]
        pub title: String,
        #[prost(string, tag = "6")]
        pub summary: String,
        #[prost(bool, tag = "7")]
        pub expedited: bool,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct MsgVote {
        #[prost(uint64, tag = "1")]
        pub proposal_id: u64,
        #[prost(string, tag = "2")]
        pub voter: String,
        #[prost(int32, tag = "3")]
        pub option: i32,
        #[prost(string, tag = "4")]
        pub metadata: String,
    }

    named!(GOV_PACKAGE => MsgSubmitProposal, MsgVote);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_urls_follow_the_package() {
        let any = to_any(&MsgRequestBatch {
            orchestrator: "helios1abc".into(),
            denom: "ahelios".into(),
            hyperion_id: 21,
        });
        assert_eq!(any.type_url, "/helios.hyperion.v1.MsgRequestBatch");
        assert_eq!(
            MsgRequestBatch::decode(any.value.as_slice()).unwrap().hyperion_id,
            21
        );
        assert_eq!(gov::MsgVote::type_url(), "/cosmos.gov.v1.MsgVote");
        assert_eq!(
            query_path("CurrentValset"),
            "/helios.hyperion.v1.Query/CurrentValset"
        );
    }
}
