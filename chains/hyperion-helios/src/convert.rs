//! Conversions between the module's protobuf types and the core domain
//! types. Addresses travel as `0x` hex strings and amounts as decimal strings.

use cosmrs::{AccountId, Any};
use tracing::warn;

use hyperion_core::utils::parse_address;
use hyperion_core::{
    BatchConfirm, BatchTransaction, BridgeEvent, ChainCommunicationError, ChainResult,
    CounterpartyChainParams, ExternalCallTx, ExternalDataClaim, ExternalDataClaimRecord,
    HyperionId, HyperionParams, LastClaimEvent, OutgoingBatch, SkippedTx, TokenFees, Valset,
    ValsetConfirm, ValsetMember, H160, H256, U256,
};

use crate::proto::{self, to_any};

pub(crate) fn fmt_address(address: &H160) -> String {
    format!("{address:?}")
}

/// Empty strings are zero.
pub(crate) fn parse_amount(value: &str) -> ChainResult<U256> {
    if value.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(value)
        .map_err(|e| ChainCommunicationError::ParseError(format!("amount {value:?}: {e}")))
}

/// Empty strings are the zero address.
fn parse_optional_address(value: &str) -> ChainResult<H160> {
    if value.is_empty() {
        return Ok(H160::zero());
    }
    parse_address(value)
}

pub(crate) fn valset_from_proto(valset: proto::Valset) -> ChainResult<Valset> {
    let members = valset
        .members
        .iter()
        .map(|m| Ok(ValsetMember::new(parse_address(&m.ethereum_address)?, m.power)))
        .collect::<ChainResult<Vec<_>>>()?;
    Ok(Valset::new(valset.nonce, valset.height, members).with_reward(
        parse_amount(&valset.reward_amount)?,
        parse_optional_address(&valset.reward_token)?,
    ))
}

pub(crate) fn valset_to_proto(hyperion_id: HyperionId, valset: &Valset) -> proto::Valset {
    proto::Valset {
        nonce: valset.nonce,
        members: members_to_proto(valset),
        height: valset.height,
        reward_amount: valset.reward_amount.to_string(),
        reward_token: fmt_address(&valset.reward_token),
        hyperion_id,
    }
}

fn members_to_proto(valset: &Valset) -> Vec<proto::BridgeValidator> {
    valset
        .members
        .iter()
        .map(|m| proto::BridgeValidator {
            power: m.power,
            ethereum_address: fmt_address(&m.eth_address),
        })
        .collect()
}

pub(crate) fn batch_from_proto(batch: proto::OutgoingTxBatch) -> ChainResult<OutgoingBatch> {
    let transactions = batch
        .transactions
        .into_iter()
        .map(|tx| {
            let amount = tx.erc20_token.map(|t| t.amount).unwrap_or_default();
            let fee = tx.erc20_fee.map(|t| t.amount).unwrap_or_default();
            Ok(BatchTransaction {
                id: tx.id,
                sender: tx.sender,
                dest: parse_address(&tx.dest_address)?,
                amount: parse_amount(&amount)?,
                fee: parse_amount(&fee)?,
            })
        })
        .collect::<ChainResult<Vec<_>>>()?;
    Ok(OutgoingBatch {
        hyperion_id: batch.hyperion_id,
        token_contract: parse_address(&batch.token_contract)?,
        batch_nonce: batch.batch_nonce,
        batch_timeout: batch.batch_timeout,
        block: batch.block,
        transactions,
    })
}

pub(crate) fn token_fees_from_proto(fees: proto::BatchFees) -> ChainResult<TokenFees> {
    Ok(TokenFees {
        token: parse_address(&fees.token)?,
        total_fees: parse_amount(&fees.total_fees)?,
        tx_count: fees.tx_count,
    })
}

pub(crate) fn params_from_proto(params: proto::Params) -> ChainResult<HyperionParams> {
    let counterparty_chain_params = params
        .counterparty_chain_params
        .into_iter()
        .map(|p| {
            Ok(CounterpartyChainParams {
                hyperion_id: p.hyperion_id,
                bridge_contract_address: parse_optional_address(&p.bridge_counterparty_address)?,
                bridge_contract_start_height: p.bridge_contract_start_height,
                bridge_chain_id: p.bridge_chain_id,
                bridge_chain_name: p.bridge_chain_name,
                average_counterparty_block_time: p.average_counterparty_block_time,
                target_batch_timeout: p.target_batch_timeout,
                confirmation_delay: match p.bridge_chain_confirmation_delay {
                    0 => None,
                    delay => Some(delay),
                },
            })
        })
        .collect::<ChainResult<Vec<_>>>()?;
    Ok(HyperionParams {
        counterparty_chain_params,
    })
}

pub(crate) fn params_to_proto(params: &CounterpartyChainParams) -> proto::CounterpartyChainParams {
    proto::CounterpartyChainParams {
        hyperion_id: params.hyperion_id,
        bridge_counterparty_address: fmt_address(&params.bridge_contract_address),
        bridge_chain_id: params.bridge_chain_id,
        bridge_chain_name: params.bridge_chain_name.clone(),
        bridge_contract_start_height: params.bridge_contract_start_height,
        average_counterparty_block_time: params.average_counterparty_block_time,
        target_batch_timeout: params.target_batch_timeout,
        bridge_chain_confirmation_delay: params.confirmation_delay.unwrap_or_default(),
    }
}

pub(crate) fn last_claim_from_proto(event: Option<proto::LastClaimEvent>) -> LastClaimEvent {
    event
        .map(|e| LastClaimEvent {
            event_nonce: e.ethereum_event_nonce,
            event_height: e.ethereum_event_height,
        })
        .unwrap_or_default()
}

pub(crate) fn valset_confirm_from_proto(confirm: proto::MsgValsetConfirm) -> ChainResult<ValsetConfirm> {
    Ok(ValsetConfirm {
        nonce: confirm.nonce,
        orchestrator: confirm.orchestrator,
        eth_address: parse_address(&confirm.eth_address)?,
        signature: confirm.signature,
    })
}

pub(crate) fn batch_confirm_from_proto(confirm: proto::MsgConfirmBatch) -> ChainResult<BatchConfirm> {
    Ok(BatchConfirm {
        nonce: confirm.nonce,
        token_contract: parse_address(&confirm.token_contract)?,
        orchestrator: confirm.orchestrator,
        eth_address: parse_address(&confirm.eth_signer)?,
        signature: confirm.signature,
    })
}

pub(crate) fn external_tx_from_proto(tx: proto::OutgoingExternalDataTx) -> ChainResult<ExternalCallTx> {
    Ok(ExternalCallTx {
        hyperion_id: tx.hyperion_id,
        nonce: tx.nonce,
        external_contract_address: parse_address(&tx.external_contract_address)?,
        abi_call_hex: tx.abi_call_hex,
        votes: tx.votes,
        claims: tx
            .claims
            .into_iter()
            .map(|c| ExternalDataClaimRecord {
                tx_nonce: c.tx_nonce,
                block_height: c.block_height,
                call_data_result: c.call_data_result,
                call_data_result_error: c.call_data_result_error,
            })
            .collect(),
    })
}

pub(crate) fn skipped_from_proto(tx: proto::SkippedTx) -> SkippedTx {
    SkippedTx {
        hyperion_id: tx.hyperion_id,
        nonce: tx.nonce,
        start_height: tx.start_height,
        end_height: tx.end_height,
    }
}

pub(crate) fn external_claim_to_proto(
    claim: &ExternalDataClaim,
    orchestrator: &str,
) -> proto::MsgExternalDataClaim {
    proto::MsgExternalDataClaim {
        hyperion_id: claim.hyperion_id,
        tx_nonce: claim.tx_nonce,
        block_height: claim.block_height,
        external_contract_address: fmt_address(&claim.external_contract_address),
        call_data_result: claim.call_data_result.clone(),
        call_data_result_error: claim.call_data_result_error.clone(),
        orchestrator: orchestrator.to_owned(),
        rpc_used: claim.rpc_used.clone(),
    }
}

/// Home chain receiver of a deposit. A destination that is not a left
/// padded 20 byte address is passed through as hex and left to the module to
/// reject.
pub(crate) fn deposit_receiver(destination: &H256, prefix: &str) -> String {
    let bytes = destination.as_bytes();
    if bytes[..12].iter().all(|b| *b == 0) {
        match AccountId::new(prefix, &bytes[12..]) {
            Ok(account) => return account.to_string(),
            Err(error) => warn!(?destination, %error, "Could not encode deposit receiver"),
        }
    }
    format!("{destination:?}")
}

/// One claim message per event, in the given order.
pub(crate) fn claim_to_any(
    hyperion_id: HyperionId,
    orchestrator: &str,
    prefix: &str,
    event: &BridgeEvent,
) -> Any {
    let orchestrator = orchestrator.to_owned();
    match event {
        BridgeEvent::SendToHome(e) => to_any(&proto::MsgDepositClaim {
            event_nonce: e.event_nonce,
            block_height: e.block_height,
            token_contract: fmt_address(&e.token_contract),
            amount: e.amount.to_string(),
            ethereum_sender: fmt_address(&e.sender),
            cosmos_receiver: deposit_receiver(&e.destination, prefix),
            orchestrator,
            data: e.data.clone(),
            hyperion_id,
        }),
        BridgeEvent::TransactionBatchExecuted(e) => to_any(&proto::MsgWithdrawClaim {
            event_nonce: e.event_nonce,
            block_height: e.block_height,
            batch_nonce: e.batch_nonce,
            token_contract: fmt_address(&e.token_contract),
            orchestrator,
            hyperion_id,
        }),
        BridgeEvent::ValsetUpdated(e) => to_any(&proto::MsgValsetUpdatedClaim {
            event_nonce: e.event_nonce,
            valset_nonce: e.valset_nonce,
            block_height: e.block_height,
            members: members_to_proto(&e.to_valset()),
            reward_amount: e.reward_amount.to_string(),
            reward_token: fmt_address(&e.reward_token),
            orchestrator,
            hyperion_id,
        }),
        BridgeEvent::Erc20Deployed(e) => to_any(&proto::MsgERC20DeployedClaim {
            event_nonce: e.event_nonce,
            block_height: e.block_height,
            cosmos_denom: e.denom.clone(),
            token_contract: fmt_address(&e.token_contract),
            name: e.name.clone(),
            symbol: e.symbol.clone(),
            decimals: e.decimals as u64,
            orchestrator,
            hyperion_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use hyperion_core::test_utils;
    use prost::Message;

    use super::*;

    #[test]
    fn deposit_claim_carries_every_field() {
        let mut deposit = test_utils::deposit(4, 120);
        deposit.destination = hyperion_core::utils::address_to_h256(test_utils::address(0x11));
        let any = claim_to_any(21, "helios1orch", "helios", &BridgeEvent::SendToHome(deposit));
        assert_eq!(any.type_url, "/helios.hyperion.v1.MsgDepositClaim");

        let claim = proto::MsgDepositClaim::decode(any.value.as_slice()).unwrap();
        assert_eq!(claim.event_nonce, 4);
        assert_eq!(claim.block_height, 120);
        assert_eq!(claim.hyperion_id, 21);
        assert_eq!(claim.amount, "1000");
        assert_eq!(claim.orchestrator, "helios1orch");
        assert_eq!(
            claim.token_contract,
            "0xcccccccccccccccccccccccccccccccccccccccc"
        );
        let receiver: AccountId = claim.cosmos_receiver.parse().unwrap();
        assert_eq!(receiver.to_bytes(), test_utils::address(0x11).as_bytes());
    }

    #[test]
    fn unpadded_receiver_passes_through_as_hex() {
        let destination = H256::repeat_byte(0xbb);
        assert_eq!(
            deposit_receiver(&destination, "helios"),
            format!("{destination:?}")
        );
    }

    #[test]
    fn valset_round_trips_through_the_module_shape() {
        let valset = test_utils::valset(3, 3).with_reward(U256::from(9), test_utils::address(7));
        let back = valset_from_proto(valset_to_proto(21, &valset)).unwrap();
        assert_eq!(back, valset);

        let empty_reward = proto::Valset {
            reward_amount: String::new(),
            reward_token: String::new(),
            ..valset_to_proto(21, &valset)
        };
        let parsed = valset_from_proto(empty_reward).unwrap();
        assert!(parsed.reward_amount.is_zero());
        assert_eq!(parsed.reward_token, H160::zero());
    }

    #[test]
    fn batch_amounts_and_fees_are_parsed() {
        let batch = proto::OutgoingTxBatch {
            hyperion_id: 21,
            batch_nonce: 8,
            batch_timeout: 5_000,
            transactions: vec![proto::OutgoingTransferTx {
                hyperion_id: 21,
                id: 1,
                sender: "helios1sender".into(),
                dest_address: fmt_address(&test_utils::address(0xdd)),
                erc20_token: Some(proto::Token {
                    contract: fmt_address(&test_utils::address(0xcc)),
                    amount: "500".into(),
                }),
                erc20_fee: Some(proto::Token {
                    contract: fmt_address(&test_utils::address(0xcc)),
                    amount: "5".into(),
                }),
            }],
            token_contract: fmt_address(&test_utils::address(0xcc)),
            block: 50,
        };
        let batch = batch_from_proto(batch).unwrap();
        assert_eq!(batch, {
            let mut expected = test_utils::batch(21, 8, test_utils::address(0xcc));
            expected.batch_timeout = 5_000;
            expected.transactions[0].id = 1;
            expected
        });
        assert!(parse_amount("12abc").is_err());
    }

    #[test]
    fn zero_confirmation_delay_means_default() {
        let params = params_from_proto(proto::Params {
            counterparty_chain_params: vec![proto::CounterpartyChainParams {
                hyperion_id: 21,
                bridge_counterparty_address: fmt_address(&test_utils::address(1)),
                bridge_chain_id: 11155111,
                ..Default::default()
            }],
        })
        .unwrap();
        let chain = params.for_hyperion(21).unwrap();
        assert_eq!(chain.confirmation_delay, None);
        assert_eq!(params_to_proto(chain).bridge_chain_id, 11155111);
    }
}
