//! Fixtures shared by tests across the workspace.

use crate::{
    BatchTransaction, OutgoingBatch, SendToHomeEvent, Valset, ValsetMember, H160, H256, U256,
};

/// Address made of a single repeated byte.
pub fn address(byte: u8) -> H160 {
    H160::repeat_byte(byte)
}

/// A valset whose members are `address(1..=n)` with descending powers
/// summing to `2^32 - 1`.
pub fn valset(nonce: u64, members: u8) -> Valset {
    let members: Vec<ValsetMember> = (1..=members)
        .map(|i| ValsetMember::new(address(i), 1_000 * (members - i + 1) as u64))
        .collect();
    Valset::new(nonce, nonce * 10, members).normalized()
}

/// A deposit event with the given nonce and block.
pub fn deposit(event_nonce: u64, block_height: u64) -> SendToHomeEvent {
    SendToHomeEvent {
        sender: address(0xaa),
        destination: H256::repeat_byte(0xbb),
        token_contract: address(0xcc),
        amount: U256::from(1_000u64),
        data: String::new(),
        event_nonce,
        block_height,
        tx_hash: H256::from_low_u64_be(event_nonce),
    }
}

/// A single transaction batch for `token`.
pub fn batch(hyperion_id: u64, batch_nonce: u64, token: H160) -> OutgoingBatch {
    OutgoingBatch {
        hyperion_id,
        token_contract: token,
        batch_nonce,
        batch_timeout: 10_000,
        block: 50,
        transactions: vec![BatchTransaction {
            id: batch_nonce,
            sender: "helios1sender".into(),
            dest: address(0xdd),
            amount: U256::from(500u64),
            fee: U256::from(5u64),
        }],
    }
}
