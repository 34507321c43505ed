use std::fmt::{Display, Formatter};
use std::time::Duration;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::H160;

/// Identifier of a bridge deployment, embedded in the contract and every
/// claim or confirmation.
pub type HyperionId = u64;

/// EVM chain id of a counterparty chain.
pub type ChainId = u64;

/// The pair of identifiers an orchestrator instance is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
pub struct BridgeLocator {
    /// Deployment identifier on the home chain
    pub hyperion_id: HyperionId,
    /// Counterparty EVM chain id
    pub chain_id: ChainId,
}

impl Display for BridgeLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "hyperion-{}@{}", self.hyperion_id, self.chain_id)
    }
}

/// Home-chain parameters for one counterparty chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterpartyChainParams {
    /// Deployment identifier
    pub hyperion_id: HyperionId,
    /// Address of the bridge contract
    pub bridge_contract_address: H160,
    /// Block the bridge contract was deployed at
    pub bridge_contract_start_height: u64,
    /// Counterparty EVM chain id
    pub bridge_chain_id: ChainId,
    /// Human readable chain name
    pub bridge_chain_name: String,
    /// Average block time on the counterparty chain in milliseconds
    pub average_counterparty_block_time: u64,
    /// Number of counterparty blocks after which a batch times out
    pub target_batch_timeout: u64,
    /// Counterparty blocks to wait before an event counts as final
    pub confirmation_delay: Option<u64>,
}

impl CounterpartyChainParams {
    /// Average block time as a duration, defaulting to 12 seconds.
    pub fn average_block_time(&self) -> Duration {
        match self.average_counterparty_block_time {
            0 => Duration::from_secs(12),
            ms => Duration::from_millis(ms),
        }
    }

    /// Locator for this bridge deployment.
    pub fn locator(&self) -> BridgeLocator {
        BridgeLocator::new(self.hyperion_id, self.bridge_chain_id)
    }
}

/// Home-chain module parameters relevant to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperionParams {
    /// All registered counterparty chains
    pub counterparty_chain_params: Vec<CounterpartyChainParams>,
}

impl HyperionParams {
    /// Parameters for a given deployment.
    pub fn for_hyperion(&self, hyperion_id: HyperionId) -> Option<&CounterpartyChainParams> {
        self.counterparty_chain_params
            .iter()
            .find(|p| p.hyperion_id == hyperion_id)
    }

    /// Parameters for a given EVM chain id.
    pub fn for_chain(&self, chain_id: ChainId) -> Option<&CounterpartyChainParams> {
        self.counterparty_chain_params
            .iter()
            .find(|p| p.bridge_chain_id == chain_id)
    }
}
