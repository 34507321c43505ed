use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{HyperionId, H160};

/// A claim another orchestrator already made for an external call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDataClaimRecord {
    /// Nonce of the external call tx
    pub tx_nonce: u64,
    /// Counterparty block the call was executed at
    pub block_height: u64,
    /// Returned data
    pub call_data_result: Vec<u8>,
    /// Error returned by the call
    pub call_data_result_error: String,
}

impl ExternalDataClaimRecord {
    fn outcome(&self) -> (u64, &[u8], &str) {
        (
            self.tx_nonce,
            self.call_data_result.as_slice(),
            self.call_data_result_error.as_str(),
        )
    }
}

/// A read-only call the home chain wants executed on the counterparty chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCallTx {
    /// Deployment the request belongs to
    pub hyperion_id: HyperionId,
    /// Unique nonce of the request
    pub nonce: u64,
    /// Contract to call
    pub external_contract_address: H160,
    /// Hex encoded calldata
    pub abi_call_hex: String,
    /// Home chain addresses that already voted
    pub votes: Vec<String>,
    /// Claims made so far
    pub claims: Vec<ExternalDataClaimRecord>,
}

impl ExternalCallTx {
    /// Whether `orchestrator` already voted on this request.
    pub fn has_voted(&self, orchestrator: &str) -> bool {
        self.votes.iter().any(|v| v == orchestrator)
    }

    /// Decode the hex calldata.
    pub fn calldata(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(self.abi_call_hex.trim_start_matches("0x"))
    }

    /// The claim most other relayers agreed on, keyed by
    /// `(tx_nonce, call_data_result, call_data_result_error)`. Ties resolve to
    /// the first encountered.
    pub fn dominant_claim(&self) -> Option<&ExternalDataClaimRecord> {
        let counts = self.claims.iter().counts_by(ExternalDataClaimRecord::outcome);
        // max_by_key keeps the last maximum, so walk backwards
        self.claims
            .iter()
            .rev()
            .max_by_key(|claim| counts.get(&claim.outcome()).copied().unwrap_or_default())
    }
}

/// A claim reporting the result of an external call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDataClaim {
    /// Deployment the request belongs to
    pub hyperion_id: HyperionId,
    /// Nonce of the external call tx
    pub tx_nonce: u64,
    /// Counterparty block the call was executed at
    pub block_height: u64,
    /// Contract that was called
    pub external_contract_address: H160,
    /// Returned data
    pub call_data_result: Vec<u8>,
    /// Error returned by the call
    pub call_data_result_error: String,
    /// Endpoint that served the call
    pub rpc_used: String,
}

/// Raw outcome of a read-only call. Reverts are data, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Returned data, empty on error
    pub data: Vec<u8>,
    /// Error message, empty on success
    pub error: String,
    /// Endpoint that served the call
    pub rpc_used: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(height: u64, data: &[u8]) -> ExternalDataClaimRecord {
        ExternalDataClaimRecord {
            tx_nonce: 7,
            block_height: height,
            call_data_result: data.to_vec(),
            call_data_result_error: String::new(),
        }
    }

    fn tx(claims: Vec<ExternalDataClaimRecord>) -> ExternalCallTx {
        ExternalCallTx {
            hyperion_id: 1,
            nonce: 7,
            external_contract_address: H160::zero(),
            abi_call_hex: "0x313ce567".into(),
            votes: vec!["helios1me".into()],
            claims,
        }
    }

    #[test]
    fn picks_the_mode() {
        let tx = tx(vec![claim(10, b"a"), claim(11, b"b"), claim(12, b"b")]);
        assert_eq!(tx.dominant_claim().unwrap().block_height, 11);
        assert!(tx.has_voted("helios1me"));
        assert_eq!(tx.calldata().unwrap(), vec![0x31, 0x3c, 0xe5, 0x67]);
    }

    #[test]
    fn ties_resolve_to_first() {
        let tx = tx(vec![claim(10, b"a"), claim(11, b"b")]);
        assert_eq!(tx.dominant_claim().unwrap().block_height, 10);
        assert!(super::ExternalCallTx {
            claims: vec![],
            ..tx
        }
        .dominant_claim()
        .is_none());
    }
}
