//! This crate contains the shared plumbing of Hyperion agents: settings,
//! tracing, metrics, the admin server, persistence and the price feed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use agent::*;
pub use metrics::*;
pub use price::*;
pub use server::*;
pub use storage::*;

/// Settings of the agents, loaded from config files and the environment
pub mod settings;

mod agent;
mod metrics;
mod price;
mod server;
mod storage;

#[cfg(feature = "oneline-errors")]
mod oneline_eyre;
