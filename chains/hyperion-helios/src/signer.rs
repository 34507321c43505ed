use std::fmt::{Debug, Formatter};

use cosmrs::proto::cosmos::crypto::secp256k1::PubKey;
use cosmrs::{AccountId, Any};
use k256::ecdsa::{SigningKey, VerifyingKey};
use prost::Message;

use hyperion_core::encode::keccak256;
use hyperion_core::H160;

use crate::HeliosError;

/// Type url of ethsecp256k1 public keys on Helios.
pub const DEFAULT_PUBKEY_TYPE_URL: &str = "/helios.crypto.v1.ethsecp256k1.PubKey";

/// Signer for Helios transactions.
///
/// Helios accounts are ethsecp256k1: the account address is the bech32
/// encoding of the EVM address of the key and sign docs are signed over their
/// keccak256 hash.
#[derive(Clone)]
pub struct HeliosSigner {
    signing_key: SigningKey,
    eth_address: H160,
    account_id: AccountId,
    pubkey_type_url: String,
}

impl Debug for HeliosSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeliosSigner")
            .field("address", &self.account_id.as_ref())
            .field("eth_address", &self.eth_address)
            .finish()
    }
}

impl HeliosSigner {
    /// Build from a raw 32 byte private key.
    pub fn new(
        secret: &[u8],
        prefix: &str,
        pubkey_type_url: impl Into<String>,
    ) -> Result<Self, HeliosError> {
        let signing_key = SigningKey::from_slice(secret)?;
        let eth_address = eth_address_of(signing_key.verifying_key());
        let account_id = AccountId::new(prefix, eth_address.as_bytes())?;
        Ok(Self {
            signing_key,
            eth_address,
            account_id,
            pubkey_type_url: pubkey_type_url.into(),
        })
    }

    /// Bech32 account address
    pub fn address(&self) -> String {
        self.account_id.to_string()
    }

    /// EVM address of the same key
    pub fn eth_address(&self) -> H160 {
        self.eth_address
    }

    /// Public key as carried in a signer info.
    pub fn public_key_any(&self) -> Any {
        let key = self
            .signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        Any {
            type_url: self.pubkey_type_url.clone(),
            value: PubKey { key }.encode_to_vec(),
        }
    }

    /// Sign the serialized sign doc, returning `r || s || v` with `v` in {0, 1}.
    pub fn sign(&self, sign_doc: &[u8]) -> Result<Vec<u8>, HeliosError> {
        let digest = keccak256(sign_doc);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_bytes())?;
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte());
        Ok(bytes)
    }
}

/// EVM address of a secp256k1 public key.
pub fn eth_address_of(key: &VerifyingKey) -> H160 {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    H160::from_slice(&hash.as_bytes()[12..])
}
