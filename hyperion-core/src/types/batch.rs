use serde::{Deserialize, Serialize};

use crate::{HyperionId, H160, U256};

/// A single withdrawal inside an outgoing batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTransaction {
    /// Home chain id of the withdrawal
    pub id: u64,
    /// Home chain sender
    pub sender: String,
    /// Counterparty recipient
    pub dest: H160,
    /// Amount of `token_contract` to pay out
    pub amount: U256,
    /// Fee paid to the relayer
    pub fee: U256,
}

/// A batch of withdrawals of a single token produced by the home chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingBatch {
    /// Deployment this batch belongs to
    pub hyperion_id: HyperionId,
    /// Token paid out by every transaction
    pub token_contract: H160,
    /// Strictly monotone per token
    pub batch_nonce: u64,
    /// Counterparty block after which the batch can not execute
    pub batch_timeout: u64,
    /// Home chain block the batch was created at
    pub block: u64,
    /// Withdrawals in the order the contract pays them
    pub transactions: Vec<BatchTransaction>,
}

impl OutgoingBatch {
    /// Sum of the relayer fees.
    pub fn total_fees(&self) -> U256 {
        self.transactions
            .iter()
            .fold(U256::zero(), |acc, tx| acc.saturating_add(tx.fee))
    }

    /// Amounts in order.
    pub fn amounts(&self) -> Vec<U256> {
        self.transactions.iter().map(|tx| tx.amount).collect()
    }

    /// Destinations in order.
    pub fn destinations(&self) -> Vec<H160> {
        self.transactions.iter().map(|tx| tx.dest).collect()
    }

    /// Fees in order.
    pub fn fees(&self) -> Vec<U256> {
        self.transactions.iter().map(|tx| tx.fee).collect()
    }

    /// A batch is live while the contract has not moved past it and its
    /// timeout block has not elapsed.
    pub fn is_live(&self, contract_batch_nonce: u64, counterparty_height: u64) -> bool {
        self.batch_nonce > contract_batch_nonce && self.batch_timeout > counterparty_height
    }
}

/// Fees accumulated for a token that has not been batched yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFees {
    /// Counterparty token address
    pub token: H160,
    /// Sum of fees of all unbatched withdrawals
    pub total_fees: U256,
    /// Number of unbatched withdrawals
    pub tx_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_depends_on_nonce_and_timeout() {
        let batch = OutgoingBatch {
            hyperion_id: 1,
            token_contract: H160::repeat_byte(1),
            batch_nonce: 5,
            batch_timeout: 1000,
            block: 10,
            transactions: vec![],
        };
        assert!(batch.is_live(4, 999));
        assert!(!batch.is_live(5, 999));
        assert!(!batch.is_live(4, 1000));
    }
}
