use ethers::providers::ProviderError;
use ethers::signers::WalletError;

use hyperion_core::{is_stale_endpoint_message, ChainCommunicationError};

/// Errors from the crates specific to the hyperion-ethereum
/// implementation.
/// This error can then be converted into the broader error type
/// in hyperion-core using the `From` trait impl
#[derive(Debug, thiserror::Error)]
pub enum HyperionEthereumError {
    /// Error returned by a JSON-RPC endpoint
    #[error(transparent)]
    ProviderError(#[from] ProviderError),
    /// Error while signing
    #[error(transparent)]
    WalletError(#[from] WalletError),
    /// Error while ABI decoding a return value or log
    #[error(transparent)]
    AbiError(#[from] ethers::abi::Error),
    /// Contract call failed
    #[error("contract call failed: {0}")]
    ContractError(String),
    /// Endpoint URL can not be parsed
    #[error("invalid rpc url {url}: {source}")]
    InvalidUrl {
        /// The rejected url
        url: String,
        /// Parse error
        source: url::ParseError,
    },
    /// Error fetching the public endpoint list
    #[error(transparent)]
    HttpError(#[from] reqwest::Error),
}

impl From<HyperionEthereumError> for ChainCommunicationError {
    fn from(value: HyperionEthereumError) -> Self {
        let message = value.to_string();
        if is_stale_endpoint_message(&message) {
            return ChainCommunicationError::StaleEndpoint(message);
        }
        ChainCommunicationError::from_other(value)
    }
}

/// Turn a contract call failure into a chain error, keeping the node message.
pub(crate) fn contract_err<E: std::fmt::Display>(err: E) -> ChainCommunicationError {
    HyperionEthereumError::ContractError(err.to_string()).into()
}

/// Turn a provider failure into a chain error.
pub(crate) fn provider_err(err: ProviderError) -> ChainCommunicationError {
    HyperionEthereumError::from(err).into()
}
