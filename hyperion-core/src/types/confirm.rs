use serde::{Deserialize, Serialize};

use crate::{H160, H256};

/// A signer's confirmation of a valset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValsetConfirm {
    /// Nonce of the confirmed valset
    pub nonce: u64,
    /// Home chain address of the orchestrator
    pub orchestrator: String,
    /// Counterparty address the signature recovers to
    pub eth_address: H160,
    /// 65 byte signature, hex encoded
    pub signature: String,
}

/// A signer's confirmation of an outgoing batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfirm {
    /// Nonce of the confirmed batch
    pub nonce: u64,
    /// Token of the confirmed batch
    pub token_contract: H160,
    /// Home chain address of the orchestrator
    pub orchestrator: String,
    /// Counterparty address the signature recovers to
    pub eth_address: H160,
    /// 65 byte signature, hex encoded
    pub signature: String,
}

/// Anything that carries an EVM signature from a valset member.
pub trait Confirmation {
    /// Counterparty address of the signer
    fn eth_address(&self) -> H160;
    /// Hex encoded signature
    fn signature(&self) -> &str;
}

impl Confirmation for ValsetConfirm {
    fn eth_address(&self) -> H160 {
        self.eth_address
    }

    fn signature(&self) -> &str {
        &self.signature
    }
}

impl Confirmation for BatchConfirm {
    fn eth_address(&self) -> H160 {
        self.eth_address
    }

    fn signature(&self) -> &str {
        &self.signature
    }
}

/// A signed digest ready to be broadcast as a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDigest {
    /// Digest that was signed
    pub digest: H256,
    /// Signer address
    pub eth_address: H160,
    /// 65 byte `r || s || v` signature
    pub signature: Vec<u8>,
}
