use async_trait::async_trait;
use ethers::signers::coins_bip39::English;
use ethers::signers::{LocalWallet, MnemonicBuilder, Signer};
use ethers::types::{H160, H256};

use hyperion_core::{ChainResult, EthSignature, EthSigner};

use crate::HyperionEthereumError;

/// Default derivation path of the orchestrator key.
const DERIVATION_PATH: &str = "m/44'/60'/0'/0/";

/// Local secp256k1 key used both for confirmations and counterparty
/// transactions.
#[derive(Debug, Clone)]
pub struct EthereumSigner {
    wallet: LocalWallet,
}

impl EthereumSigner {
    /// Load from a hex private key, with or without `0x`.
    pub fn from_hex(key: &str) -> Result<Self, HyperionEthereumError> {
        let wallet: LocalWallet = key.trim().trim_start_matches("0x").parse()?;
        Ok(Self { wallet })
    }

    /// Derive account `index` from a BIP-39 phrase.
    pub fn from_mnemonic(phrase: &str, index: u32) -> Result<Self, HyperionEthereumError> {
        let wallet = MnemonicBuilder::<English>::default()
            .phrase(phrase)
            .derivation_path(&format!("{DERIVATION_PATH}{index}"))?
            .build()?;
        Ok(Self { wallet })
    }

    /// The wallet, for building a committer.
    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }

    /// Raw 32 byte private key.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.wallet.signer().to_bytes().into()
    }
}

#[async_trait]
impl EthSigner for EthereumSigner {
    fn eth_address(&self) -> H160 {
        self.wallet.address()
    }

    async fn sign_hash(&self, hash: &H256) -> ChainResult<EthSignature> {
        let signature = self
            .wallet
            .sign_hash(*hash)
            .map_err(HyperionEthereumError::from)?;
        EthSignature::from_bytes(&signature.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::Signature;
    use hyperion_core::encode::eth_signed_message_hash;
    use hyperion_core::EthSignerExt;

    use super::*;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[tokio::test]
    async fn personal_sign_recovers_to_signer() {
        let signer = EthereumSigner::from_hex(KEY).unwrap();
        let digest = H256::repeat_byte(0x11);
        let signed = signer.sign_digest(digest).await.unwrap();

        assert_eq!(signed.signature.len(), 65);
        assert!(matches!(signed.signature[64], 27 | 28));
        let signature = Signature::try_from(signed.signature.as_slice()).unwrap();
        let recovered = signature.recover(eth_signed_message_hash(&digest)).unwrap();
        assert_eq!(recovered, signer.eth_address());
    }

    #[test]
    fn mnemonic_accounts_differ_by_index() {
        let phrase = "test test test test test test test test test test test junk";
        let first = EthereumSigner::from_mnemonic(phrase, 0).unwrap();
        let second = EthereumSigner::from_mnemonic(phrase, 1).unwrap();
        assert_eq!(
            format!("{:?}", first.eth_address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_ne!(first.eth_address(), second.eth_address());
    }
}
