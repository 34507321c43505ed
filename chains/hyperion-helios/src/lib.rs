//! Implementation of the Hyperion home chain client for the Helios network.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use self::{client::*, conf::*, error::*, proposals::*, provider::*, signer::*};

/// Protobuf messages of the hyperion module and the governance messages it
/// is driven by
pub mod proto;

mod client;
mod conf;
mod convert;
mod error;
mod proposals;
mod provider;
mod signer;
