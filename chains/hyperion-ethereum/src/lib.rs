//! Implementation of the Hyperion counterparty chain on top of ethers-rs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use self::{
    bridge::*, committer::*, discovery::*, error::*, gas::*, nonce::*, pending::*, provider::*,
    signer::*,
};

/// Generated and hand-derived contract bindings
pub mod contracts;

mod bridge;
mod committer;
mod discovery;
mod error;
mod events;
mod gas;
mod nonce;
mod pending;
mod provider;
mod signer;
