//! The periodic tasks of an orchestrator instance.

pub use batch_creator::BatchCreator;
pub use external_data::ExternalDataRelayer;
pub use oracle::Oracle;
pub use relayer::Relayer;
pub use signer::Signer;
pub use skipped::SkippedRecovery;
pub use updater::EndpointUpdater;
pub use valset_manager::ValsetManager;

pub(crate) use valset_manager::latest_eth_valset;

mod batch_creator;
mod external_data;
mod oracle;
mod relayer;
mod signer;
mod skipped;
mod updater;
mod valset_manager;
