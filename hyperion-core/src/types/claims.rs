use serde::{Deserialize, Serialize};

use crate::HyperionId;

/// The highest event a signer has had acknowledged by the home chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastClaimEvent {
    /// Event nonce of the last acknowledged claim
    pub event_nonce: u64,
    /// Counterparty block height of that event
    pub event_height: u64,
}

/// A range of counterparty blocks the home chain reports as not claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkippedTx {
    /// Deployment the gap belongs to
    pub hyperion_id: HyperionId,
    /// Missing event nonce
    pub nonce: u64,
    /// First block to rescan
    pub start_height: u64,
    /// Last block to rescan
    pub end_height: u64,
}
