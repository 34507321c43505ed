use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hyperion_core::{ChainId, TxOutcome, H160, H256, U256};

/// Kind of submission a fee record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    /// `updateValset`
    Valset,
    /// `submitBatch`
    Batch,
}

impl FeeKind {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valset => "valset",
            Self::Batch => "batch",
        }
    }
}

/// One paid counterparty submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRecord {
    /// Relayer fees collected by the submission, in token base units
    pub fees_taken: U256,
    /// Token the fees were paid in; zero for valset updates
    pub token_contract: H160,
    /// Gas cost in wei
    pub cost: U256,
    /// Counterparty transaction
    pub tx_hash: H256,
    /// Counterparty block the submission was made at
    pub block_height: u64,
    /// Counterparty chain
    pub chain_id: ChainId,
    /// What was submitted
    pub kind: FeeKind,
    /// When the record was written
    pub timestamp: DateTime<Utc>,
}

impl FeeRecord {
    /// Record for `outcome`.
    pub fn new(
        chain_id: ChainId,
        kind: FeeKind,
        outcome: &TxOutcome,
        token_contract: H160,
        fees_taken: U256,
        block_height: u64,
    ) -> Self {
        Self {
            fees_taken,
            token_contract,
            cost: outcome.gas_cost,
            tx_hash: outcome.tx_hash,
            block_height,
            chain_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}
