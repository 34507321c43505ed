use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{H160, H256, U256};

/// The kinds of bridge events relayed to the home chain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A user deposit
    SendToHome,
    /// A withdrawal batch was consumed
    TransactionBatchExecuted,
    /// The contract accepted a new valset
    ValsetUpdated,
    /// A token was provisioned through the contract
    Erc20Deployed,
    /// Result of a read-only call requested by the home chain
    ExternalData,
}

/// A user deposit into the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToHomeEvent {
    /// Depositor on the counterparty chain
    pub sender: H160,
    /// Recipient on the home chain, left padded to 32 bytes
    pub destination: H256,
    /// Deposited token
    pub token_contract: H160,
    /// Deposited amount
    pub amount: U256,
    /// Arbitrary payload forwarded with the deposit
    pub data: String,
    /// Event nonce assigned by the contract
    pub event_nonce: u64,
    /// Counterparty block the event was emitted in
    pub block_height: u64,
    /// Transaction that emitted the event
    pub tx_hash: H256,
}

/// A withdrawal batch was executed on the counterparty chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBatchExecutedEvent {
    /// Executed batch
    pub batch_nonce: u64,
    /// Token of the batch
    pub token_contract: H160,
    /// Event nonce assigned by the contract
    pub event_nonce: u64,
    /// Counterparty block the event was emitted in
    pub block_height: u64,
    /// Transaction that emitted the event
    pub tx_hash: H256,
}

/// The contract switched to a new valset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValsetUpdatedEvent {
    /// Nonce of the new valset
    pub valset_nonce: u64,
    /// New member addresses
    pub validators: Vec<H160>,
    /// New member powers
    pub powers: Vec<u64>,
    /// Relayer reward amount
    pub reward_amount: U256,
    /// Relayer reward token
    pub reward_token: H160,
    /// Event nonce assigned by the contract
    pub event_nonce: u64,
    /// Counterparty block the event was emitted in
    pub block_height: u64,
    /// Transaction that emitted the event
    pub tx_hash: H256,
}

impl ValsetUpdatedEvent {
    /// The valset this event installed. Members keep the emitted order.
    pub fn to_valset(&self) -> crate::Valset {
        crate::Valset {
            nonce: self.valset_nonce,
            height: self.block_height,
            members: self
                .validators
                .iter()
                .zip(self.powers.iter())
                .map(|(addr, power)| crate::ValsetMember::new(*addr, *power))
                .collect(),
            reward_amount: self.reward_amount,
            reward_token: self.reward_token,
        }
    }
}

/// A token was provisioned through the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20DeployedEvent {
    /// Home chain denom the token represents
    pub denom: String,
    /// Deployed token address
    pub token_contract: H160,
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Token decimals
    pub decimals: u8,
    /// Event nonce assigned by the contract
    pub event_nonce: u64,
    /// Counterparty block the event was emitted in
    pub block_height: u64,
    /// Transaction that emitted the event
    pub tx_hash: H256,
}

/// The outcome of a read-only call requested by the home chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDataResult {
    /// Nonce of the outgoing external call tx
    pub tx_nonce: u64,
    /// Returned data
    pub call_data_result: Vec<u8>,
    /// Error message if the call reverted
    pub call_data_result_error: String,
    /// Endpoint the call was served by
    pub rpc_used: String,
    /// Counterparty block the call was executed at
    pub block_height: u64,
}

/// Any event the oracle relays as a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Deposit
    SendToHome(SendToHomeEvent),
    /// Batch executed
    TransactionBatchExecuted(TransactionBatchExecutedEvent),
    /// Valset updated
    ValsetUpdated(ValsetUpdatedEvent),
    /// Token deployed
    Erc20Deployed(Erc20DeployedEvent),
}

impl BridgeEvent {
    /// Event nonce assigned by the contract.
    pub fn event_nonce(&self) -> u64 {
        match self {
            Self::SendToHome(e) => e.event_nonce,
            Self::TransactionBatchExecuted(e) => e.event_nonce,
            Self::ValsetUpdated(e) => e.event_nonce,
            Self::Erc20Deployed(e) => e.event_nonce,
        }
    }

    /// Counterparty block the event was emitted in.
    pub fn block_height(&self) -> u64 {
        match self {
            Self::SendToHome(e) => e.block_height,
            Self::TransactionBatchExecuted(e) => e.block_height,
            Self::ValsetUpdated(e) => e.block_height,
            Self::Erc20Deployed(e) => e.block_height,
        }
    }

    /// The kind of event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SendToHome(_) => EventKind::SendToHome,
            Self::TransactionBatchExecuted(_) => EventKind::TransactionBatchExecuted,
            Self::ValsetUpdated(_) => EventKind::ValsetUpdated,
            Self::Erc20Deployed(_) => EventKind::Erc20Deployed,
        }
    }
}

/// All bridge events found in a block range, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeEvents {
    /// Deposits
    pub deposits: Vec<SendToHomeEvent>,
    /// Executed batches
    pub withdrawals: Vec<TransactionBatchExecutedEvent>,
    /// Valset updates
    pub valsets: Vec<ValsetUpdatedEvent>,
    /// Token deployments
    pub erc20_deployments: Vec<Erc20DeployedEvent>,
}

impl BridgeEvents {
    /// Whether every kind is empty.
    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty()
            && self.withdrawals.is_empty()
            && self.valsets.is_empty()
            && self.erc20_deployments.is_empty()
    }

    /// Total number of events.
    pub fn len(&self) -> usize {
        self.deposits.len()
            + self.withdrawals.len()
            + self.valsets.len()
            + self.erc20_deployments.len()
    }

    /// Keep only events matching `keep`.
    pub fn retain(&mut self, keep: impl Fn(u64) -> bool) {
        self.deposits.retain(|e| keep(e.event_nonce));
        self.withdrawals.retain(|e| keep(e.event_nonce));
        self.valsets.retain(|e| keep(e.event_nonce));
        self.erc20_deployments.retain(|e| keep(e.event_nonce));
    }

    /// Highest event nonce across all kinds.
    pub fn max_event_nonce(&self) -> Option<u64> {
        self.clone().into_sorted().last().map(|e| e.event_nonce())
    }

    /// Flatten into a single list ordered by event nonce. The sort is stable
    /// and looks at the nonce only.
    pub fn into_sorted(self) -> Vec<BridgeEvent> {
        let mut all: Vec<BridgeEvent> = self
            .deposits
            .into_iter()
            .map(BridgeEvent::SendToHome)
            .chain(
                self.withdrawals
                    .into_iter()
                    .map(BridgeEvent::TransactionBatchExecuted),
            )
            .chain(self.valsets.into_iter().map(BridgeEvent::ValsetUpdated))
            .chain(
                self.erc20_deployments
                    .into_iter()
                    .map(BridgeEvent::Erc20Deployed),
            )
            .collect();
        all.sort_by_key(|e| e.event_nonce());
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(nonce: u64) -> SendToHomeEvent {
        SendToHomeEvent {
            sender: H160::zero(),
            destination: H256::zero(),
            token_contract: H160::zero(),
            amount: U256::one(),
            data: String::new(),
            event_nonce: nonce,
            block_height: 100 + nonce,
            tx_hash: H256::zero(),
        }
    }

    fn withdrawal(nonce: u64) -> TransactionBatchExecutedEvent {
        TransactionBatchExecutedEvent {
            batch_nonce: 1,
            token_contract: H160::zero(),
            event_nonce: nonce,
            block_height: 100 + nonce,
            tx_hash: H256::zero(),
        }
    }

    #[test]
    fn sorts_across_kinds_by_nonce() {
        let events = BridgeEvents {
            deposits: vec![deposit(5), deposit(2)],
            withdrawals: vec![withdrawal(3), withdrawal(4)],
            ..Default::default()
        };
        assert_eq!(events.max_event_nonce(), Some(5));
        let nonces: Vec<u64> = events.into_sorted().iter().map(|e| e.event_nonce()).collect();
        assert_eq!(nonces, vec![2, 3, 4, 5]);
    }

    #[test]
    fn retain_filters_every_kind() {
        let mut events = BridgeEvents {
            deposits: vec![deposit(1), deposit(3)],
            withdrawals: vec![withdrawal(2)],
            ..Default::default()
        };
        events.retain(|nonce| nonce > 2);
        assert_eq!(events.len(), 1);
        assert_eq!(events.deposits[0].event_nonce, 3);
        assert_eq!(EventKind::SendToHome.to_string(), "send_to_home");
    }
}
