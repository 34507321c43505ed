use ethers::contract::{parse_log, EthEvent};
use ethers::providers::Middleware;
use ethers::types::{Address, Filter, Log, H256};
use tracing::{debug, warn};

use hyperion_core::{
    ChainResult, Erc20DeployedEvent, SendToHomeEvent, TransactionBatchExecutedEvent,
    ValsetUpdatedEvent,
};

use crate::contracts::{
    Erc20DeployedEventFilter, SendToHeliosEventFilter, TransactionBatchExecutedEventFilter,
    ValsetUpdatedEventFilter,
};
use crate::error::provider_err;
use crate::{EthRpcPool, HyperionEthereumError};

/// Block and transaction a log was emitted in.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LogMeta {
    pub block_number: u64,
    pub tx_hash: H256,
}

impl From<&Log> for LogMeta {
    fn from(log: &Log) -> Self {
        Self {
            block_number: log.block_number.map(|n| n.as_u64()).unwrap_or_default(),
            tx_hash: log.transaction_hash.unwrap_or_default(),
        }
    }
}

/// Fetch and decode every `E` emitted by `address` in `[start, end]`.
///
/// Nodes that have not indexed the range answer with "unknown block"; that
/// is reported as no events rather than an error.
pub(crate) async fn query_events<E>(
    pool: &EthRpcPool,
    address: Address,
    start: u64,
    end: u64,
) -> ChainResult<Vec<(E, LogMeta)>>
where
    E: EthEvent + Send + 'static,
{
    let filter = Filter::new()
        .address(address)
        .topic0(E::signature())
        .from_block(start)
        .to_block(end);

    let logs = pool
        .call_eth(|provider| {
            let filter = filter.clone();
            Box::pin(async move { provider.get_logs(&filter).await.map_err(provider_err) })
        })
        .await;
    let logs = match logs {
        Ok(logs) => logs,
        Err(error) if error.to_string().to_lowercase().contains("unknown block") => {
            warn!(event = %E::name(), start, end, "Range not indexed yet");
            return Ok(vec![]);
        }
        Err(error) => return Err(error),
    };

    let mut events = Vec::with_capacity(logs.len());
    for log in logs {
        let meta = LogMeta::from(&log);
        let event = parse_log::<E>(log).map_err(HyperionEthereumError::from)?;
        events.push((event, meta));
    }
    debug!(event = %E::name(), start, end, count = events.len(), "Fetched events");
    Ok(events)
}

pub(crate) fn to_send_to_home((event, meta): (SendToHeliosEventFilter, LogMeta)) -> SendToHomeEvent {
    SendToHomeEvent {
        sender: event.sender,
        destination: H256(event.destination),
        token_contract: event.token_contract,
        amount: event.amount,
        data: event.data,
        event_nonce: event.event_nonce.low_u64(),
        block_height: meta.block_number,
        tx_hash: meta.tx_hash,
    }
}

pub(crate) fn to_batch_executed(
    (event, meta): (TransactionBatchExecutedEventFilter, LogMeta),
) -> TransactionBatchExecutedEvent {
    TransactionBatchExecutedEvent {
        batch_nonce: event.batch_nonce.low_u64(),
        token_contract: event.token,
        event_nonce: event.event_nonce.low_u64(),
        block_height: meta.block_number,
        tx_hash: meta.tx_hash,
    }
}

pub(crate) fn to_valset_updated(
    (event, meta): (ValsetUpdatedEventFilter, LogMeta),
) -> ValsetUpdatedEvent {
    ValsetUpdatedEvent {
        valset_nonce: event.new_valset_nonce.low_u64(),
        validators: event.validators,
        powers: event.powers.iter().map(|p| p.low_u64()).collect(),
        reward_amount: event.reward_amount,
        reward_token: event.reward_token,
        event_nonce: event.event_nonce.low_u64(),
        block_height: meta.block_number,
        tx_hash: meta.tx_hash,
    }
}

pub(crate) fn to_erc20_deployed(
    (event, meta): (Erc20DeployedEventFilter, LogMeta),
) -> Erc20DeployedEvent {
    Erc20DeployedEvent {
        denom: event.cosmos_denom,
        token_contract: event.token_contract,
        name: event.name,
        symbol: event.symbol,
        decimals: event.decimals,
        event_nonce: event.event_nonce.low_u64(),
        block_height: meta.block_number,
        tx_hash: meta.tx_hash,
    }
}

#[cfg(test)]
mod tests {
    use ethers::abi::{encode, Token};
    use ethers::types::{Bytes, U256, U64};

    use super::*;

    #[test]
    fn decodes_deposit_log() {
        let token = Address::repeat_byte(1);
        let sender = Address::repeat_byte(2);
        let destination = [7u8; 32];
        let mut token_topic = [0u8; 32];
        token_topic[12..].copy_from_slice(token.as_bytes());
        let mut sender_topic = [0u8; 32];
        sender_topic[12..].copy_from_slice(sender.as_bytes());

        let log = Log {
            address: Address::repeat_byte(9),
            topics: vec![
                SendToHeliosEventFilter::signature(),
                H256(token_topic),
                H256(sender_topic),
                H256(destination),
            ],
            data: Bytes::from(encode(&[
                Token::Uint(U256::from(1_000u64)),
                Token::Uint(U256::from(3u64)),
                Token::String("memo".into()),
            ])),
            block_number: Some(U64::from(110)),
            transaction_hash: Some(H256::repeat_byte(5)),
            ..Default::default()
        };

        let meta = LogMeta::from(&log);
        let event: SendToHeliosEventFilter = parse_log(log).unwrap();
        let event = to_send_to_home((event, meta));
        assert_eq!(event.event_nonce, 3);
        assert_eq!(event.block_height, 110);
        assert_eq!(event.sender, sender);
        assert_eq!(event.token_contract, token);
        assert_eq!(event.destination, H256(destination));
        assert_eq!(event.data, "memo");
    }

    #[test]
    fn converts_valset_update() {
        let event = ValsetUpdatedEventFilter {
            new_valset_nonce: U256::from(2),
            event_nonce: U256::from(8),
            reward_amount: U256::zero(),
            reward_token: Address::zero(),
            validators: vec![Address::repeat_byte(2), Address::repeat_byte(1)],
            powers: vec![U256::from(3_000_000_000u64), U256::from(1_000_000_000u64)],
        };
        let converted = to_valset_updated((
            event,
            LogMeta {
                block_number: 40,
                tx_hash: H256::zero(),
            },
        ));
        let valset = converted.to_valset();
        assert_eq!(valset.nonce, 2);
        assert_eq!(valset.members[0].eth_address, Address::repeat_byte(2));
        assert_eq!(valset.members[1].power, 1_000_000_000);
    }
}
