use std::fmt::Debug;

use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::encode::eth_signed_message_hash;
use crate::{ChainResult, EthSignature, SignedDigest, H160, H256};

/// A signer for counterparty chain digests.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait EthSigner: Send + Sync + Debug {
    /// The signer's address.
    fn eth_address(&self) -> H160;

    /// Sign a 32 byte hash as is.
    async fn sign_hash(&self, hash: &H256) -> ChainResult<EthSignature>;
}

/// Extension trait for personal-sign over digests.
#[async_trait]
pub trait EthSignerExt {
    /// Sign `digest` with the Ethereum signed message prefix.
    async fn sign_digest(&self, digest: H256) -> ChainResult<SignedDigest>;
}

#[async_trait]
impl<S: EthSigner> EthSignerExt for S {
    async fn sign_digest(&self, digest: H256) -> ChainResult<SignedDigest> {
        let signature = self.sign_hash(&eth_signed_message_hash(&digest)).await?;
        Ok(SignedDigest {
            digest,
            eth_address: self.eth_address(),
            signature: signature.to_vec(),
        })
    }
}
