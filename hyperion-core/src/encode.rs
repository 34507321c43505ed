use ethers_core::abi::{encode, Token};
use tiny_keccak::{Hasher, Keccak};

use crate::{HyperionId, OutgoingBatch, Valset, H256, U256};

const CHECKPOINT_METHOD: &[u8] = b"checkpoint";
const BATCH_METHOD: &[u8] = b"transactionBatch";
const PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Keccak-256 of `data`.
pub fn keccak256(data: impl AsRef<[u8]>) -> H256 {
    let mut output = [0u8; 32];
    let mut hasher = Keccak::v256();
    hasher.update(data.as_ref());
    hasher.finalize(&mut output);
    output.into()
}

/// Right pad an ASCII method name into a `bytes32`.
fn method_name(name: &[u8]) -> Token {
    let mut out = [0u8; 32];
    out[..name.len()].copy_from_slice(name);
    Token::FixedBytes(out.to_vec())
}

/// The hyperion id as the contract stores it, big endian in a `bytes32`.
pub fn hyperion_id_bytes32(hyperion_id: HyperionId) -> [u8; 32] {
    let mut out = [0u8; 32];
    U256::from(hyperion_id).to_big_endian(&mut out);
    out
}

fn address_array(addresses: Vec<crate::H160>) -> Token {
    Token::Array(addresses.into_iter().map(Token::Address).collect())
}

fn uint_array(values: Vec<U256>) -> Token {
    Token::Array(values.into_iter().map(Token::Uint).collect())
}

/// ABI encoded payload hashed into a valset checkpoint.
pub fn valset_checkpoint_payload(hyperion_id: HyperionId, valset: &Valset) -> Vec<u8> {
    encode(&[
        Token::FixedBytes(hyperion_id_bytes32(hyperion_id).to_vec()),
        method_name(CHECKPOINT_METHOD),
        Token::Uint(valset.nonce.into()),
        address_array(valset.validators()),
        uint_array(valset.powers()),
        Token::Uint(valset.reward_amount),
        Token::Address(valset.reward_token),
    ])
}

/// `keccak256(abi.encode(hyperionId, "checkpoint", nonce, validators, powers, rewardAmount, rewardToken))`
pub fn valset_checkpoint(hyperion_id: HyperionId, valset: &Valset) -> H256 {
    keccak256(valset_checkpoint_payload(hyperion_id, valset))
}

/// Digest a signer signs to confirm a valset. It is the checkpoint itself.
pub fn encode_valset_confirm(hyperion_id: HyperionId, valset: &Valset) -> H256 {
    valset_checkpoint(hyperion_id, valset)
}

/// Digest a signer signs to confirm an outgoing batch.
pub fn encode_batch_confirm(hyperion_id: HyperionId, batch: &OutgoingBatch) -> H256 {
    keccak256(encode(&[
        Token::FixedBytes(hyperion_id_bytes32(hyperion_id).to_vec()),
        method_name(BATCH_METHOD),
        uint_array(batch.amounts()),
        address_array(batch.destinations()),
        uint_array(batch.fees()),
        Token::Uint(batch.batch_nonce.into()),
        Token::Address(batch.token_contract),
        Token::Uint(batch.batch_timeout.into()),
    ]))
}

/// Hash a digest with the Ethereum personal-sign prefix.
pub fn eth_signed_message_hash(digest: &H256) -> H256 {
    let message = digest.as_bytes();
    let mut output = [0u8; 32];
    let mut hasher = Keccak::v256();
    hasher.update(PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize(&mut output);
    output.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BatchTransaction, ValsetMember, H160};

    fn valset() -> Valset {
        Valset::new(
            3,
            10,
            vec![
                ValsetMember::new(H160::repeat_byte(1), 3_000_000_000),
                ValsetMember::new(H160::repeat_byte(2), 1_294_967_295),
            ],
        )
    }

    #[test]
    fn checkpoint_payload_layout() {
        let payload = valset_checkpoint_payload(42, &valset());
        assert_eq!(payload[31], 42);
        assert!(payload[..31].iter().all(|b| *b == 0));
        assert_eq!(&payload[32..42], b"checkpoint");
        assert!(payload[42..64].iter().all(|b| *b == 0));
        // nonce word
        assert_eq!(payload[95], 3);
    }

    #[test]
    fn checkpoint_commits_to_every_field() {
        let base = valset_checkpoint(42, &valset());
        assert_eq!(base, valset_checkpoint(42, &valset()));
        assert_ne!(base, valset_checkpoint(43, &valset()));
        let rewarded = valset().with_reward(U256::from(5), H160::repeat_byte(7));
        assert_ne!(base, valset_checkpoint(42, &rewarded));
        assert_eq!(encode_valset_confirm(42, &valset()), base);
    }

    #[test]
    fn batch_digest_depends_on_transactions() {
        let mut batch = OutgoingBatch {
            hyperion_id: 42,
            token_contract: H160::repeat_byte(9),
            batch_nonce: 1,
            batch_timeout: 500,
            block: 1,
            transactions: vec![BatchTransaction {
                id: 1,
                sender: "helios1sender".into(),
                dest: H160::repeat_byte(3),
                amount: U256::from(100),
                fee: U256::from(1),
            }],
        };
        let first = encode_batch_confirm(42, &batch);
        batch.transactions[0].fee = U256::from(2);
        assert_ne!(first, encode_batch_confirm(42, &batch));
    }

    #[test]
    fn personal_sign_prefix_matches_ethers() {
        let digest = keccak256(b"hyperion");
        assert_eq!(
            eth_signed_message_hash(&digest),
            ethers_core::utils::hash_message(digest.as_bytes())
        );
    }
}
