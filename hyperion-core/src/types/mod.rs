pub use batch::*;
pub use claims::*;
pub use confirm::*;
pub use events::*;
pub use external::*;
pub use quorum::*;
pub use signature::*;
pub use valset::*;

mod batch;
mod claims;
mod confirm;
mod events;
mod external;
mod quorum;
mod signature;
mod valset;

use serde::{Deserialize, Serialize};

use crate::H256;

/// Result of a state-changing counterparty submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    /// Hash of the broadcast transaction
    pub tx_hash: H256,
    /// gas price multiplied by the estimated gas, in wei
    pub gas_cost: crate::U256,
}

/// Result of a home-chain broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeTxResponse {
    /// Hex encoded tx hash
    pub tx_hash: String,
    /// Height the tx was included at, if known
    pub height: Option<u64>,
    /// Gas used as reported by the node
    pub gas_used: u64,
}
