use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{H160, U256};

/// Total voting power of a normalized valset.
pub const TOTAL_NORMALIZED_POWER: u64 = u32::MAX as u64;

/// A single member of a validator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValsetMember {
    /// Counterparty chain address of the orchestrator
    pub eth_address: H160,
    /// Voting power
    pub power: u64,
}

impl ValsetMember {
    /// Create a new member.
    pub fn new(eth_address: H160, power: u64) -> Self {
        Self { eth_address, power }
    }
}

impl PartialOrd for ValsetMember {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Descending power, ties broken by ascending address.
impl Ord for ValsetMember {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .power
            .cmp(&self.power)
            .then_with(|| self.eth_address.cmp(&other.eth_address))
    }
}

/// An ordered validator set with the reward paid to whoever relays it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valset {
    /// Strictly monotone per chain
    pub nonce: u64,
    /// Home chain height the valset was created at
    pub height: u64,
    /// Members in canonical order
    pub members: Vec<ValsetMember>,
    /// Reward paid to the relayer
    pub reward_amount: U256,
    /// Token the reward is paid in
    pub reward_token: H160,
}

impl Valset {
    /// Build a valset and sort its members canonically.
    pub fn new(nonce: u64, height: u64, mut members: Vec<ValsetMember>) -> Self {
        members.sort();
        Self {
            nonce,
            height,
            members,
            reward_amount: U256::zero(),
            reward_token: H160::zero(),
        }
    }

    /// Set the relayer reward.
    pub fn with_reward(mut self, reward_amount: U256, reward_token: H160) -> Self {
        self.reward_amount = reward_amount;
        self.reward_token = reward_token;
        self
    }

    /// Sum of member powers.
    pub fn total_power(&self) -> u64 {
        self.members.iter().map(|m| m.power).sum()
    }

    /// Member addresses in order.
    pub fn validators(&self) -> Vec<H160> {
        self.members.iter().map(|m| m.eth_address).collect()
    }

    /// Member powers in order, widened for ABI encoding.
    pub fn powers(&self) -> Vec<U256> {
        self.members.iter().map(|m| U256::from(m.power)).collect()
    }

    /// Whether `address` is a member of this set.
    pub fn contains(&self, address: &H160) -> bool {
        self.members.iter().any(|m| &m.eth_address == address)
    }

    /// Power of a member, zero when absent.
    pub fn power_of(&self, address: &H160) -> u64 {
        self.members
            .iter()
            .find(|m| &m.eth_address == address)
            .map(|m| m.power)
            .unwrap_or_default()
    }

    /// A single member set bypasses the quorum check.
    pub fn is_bootstrap(&self) -> bool {
        self.members.len() == 1
    }

    /// Whether the members are in canonical order.
    pub fn is_sorted(&self) -> bool {
        self.members.windows(2).all(|w| w[0] <= w[1])
    }

    /// Scale powers so they sum to at most `2^32 - 1`, keeping member order.
    pub fn normalized(&self) -> Self {
        let total = self.total_power() as u128;
        if total == 0 {
            return self.clone();
        }
        let members = self
            .members
            .iter()
            .map(|m| {
                let power = (m.power as u128 * TOTAL_NORMALIZED_POWER as u128) / total;
                ValsetMember::new(m.eth_address, power as u64)
            })
            .collect();
        Self {
            members,
            ..self.clone()
        }
    }
}
