//! This crate contains the core primitives, traits, and types for the
//! Hyperion orchestrator.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use chain::*;
pub use error::*;
pub use retry::*;
pub use traits::*;
pub use types::*;

pub use ethers_core::types::{Address, Bytes, H160, H256, U256};

/// Multi-endpoint RPC pool and endpoint error helpers
pub mod rpc_clients;
/// Digest encoders shared by signers and relayers
pub mod encode;
/// Conversion and parsing helpers
pub mod utils;

mod chain;
mod error;
mod retry;
mod traits;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
