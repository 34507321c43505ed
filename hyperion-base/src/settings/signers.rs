use eyre::{Context, Result};
use serde::Deserialize;

use hyperion_ethereum::EthereumSigner;
use hyperion_helios::HeliosSigner;

/// Key material of the orchestrator. The same secp256k1 key signs on both
/// chains.
#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignerConf {
    /// A hex encoded private key
    HexKey {
        /// Private key, with or without `0x`
        key: String,
    },
    /// A BIP-39 phrase and account index
    Mnemonic {
        /// The phrase
        phrase: String,
        /// Account index on the standard EVM derivation path
        #[serde(default)]
        index: u32,
    },
}

impl std::fmt::Debug for SignerConf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HexKey { .. } => f.write_str("HexKey { .. }"),
            Self::Mnemonic { index, .. } => write!(f, "Mnemonic {{ index: {index}, .. }}"),
        }
    }
}

impl SignerConf {
    /// Counterparty signer.
    pub fn build_eth(&self) -> Result<EthereumSigner> {
        let signer = match self {
            Self::HexKey { key } => EthereumSigner::from_hex(key),
            Self::Mnemonic { phrase, index } => EthereumSigner::from_mnemonic(phrase, *index),
        };
        signer.context("Loading orchestrator key")
    }

    /// Home chain signer over the same key.
    pub fn build_helios(&self, prefix: &str, pubkey_type_url: &str) -> Result<HeliosSigner> {
        let secret = self.build_eth()?.secret_bytes();
        HeliosSigner::new(&secret, prefix, pubkey_type_url).context("Building home chain signer")
    }
}

#[cfg(test)]
mod tests {
    use hyperion_core::EthSigner;

    use super::*;

    #[test]
    fn both_signers_share_the_key() {
        let conf: SignerConf = serde_json::from_str(
            r#"{"type": "hex_key", "key": "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"}"#,
        )
        .unwrap();
        let eth = conf.build_eth().unwrap();
        let helios = conf
            .build_helios("helios", hyperion_helios::DEFAULT_PUBKEY_TYPE_URL)
            .unwrap();
        assert_eq!(eth.eth_address(), helios.eth_address());
        assert!(helios.address().starts_with("helios1"));
        assert!(!format!("{conf:?}").contains("4c08"));
    }
}
