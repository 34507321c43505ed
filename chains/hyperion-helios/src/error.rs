use hyperion_core::{is_stale_endpoint_message, ChainCommunicationError};

/// Errors from the crates specific to the hyperion-helios
/// implementation.
/// This error can then be converted into the broader error type
/// in hyperion-core using the `From` trait impl
#[derive(Debug, thiserror::Error)]
pub enum HeliosError {
    /// Error returned by a tendermint RPC endpoint
    #[error(transparent)]
    TendermintRpcError(#[from] tendermint_rpc::Error),
    /// Error from the tendermint types, e.g. an invalid chain id
    #[error("{0}")]
    TendermintError(#[from] tendermint::Error),
    /// Error building or encoding a cosmos transaction
    #[error("{0}")]
    CosmrsErrorReport(#[from] cosmrs::ErrorReport),
    /// Protobuf decoding failed
    #[error("{0}")]
    Prost(#[from] prost::DecodeError),
    /// An ABCI query returned a non-zero code
    #[error("ABCI query failed: path={path}, code={code}, log={log}")]
    QueryFailed {
        /// Query path
        path: String,
        /// ABCI code
        code: u32,
        /// Raw log
        log: String,
    },
    /// Signing key could not be loaded or used
    #[error("{0}")]
    KeyError(String),
    /// A required field is absent from a response
    #[error("missing field {0} in response")]
    MissingField(&'static str),
}

impl From<HeliosError> for ChainCommunicationError {
    fn from(value: HeliosError) -> Self {
        let message = value.to_string();
        if is_stale_endpoint_message(&message) {
            return ChainCommunicationError::StaleEndpoint(message);
        }
        if message.contains("account sequence mismatch") {
            return ChainCommunicationError::AccountSequenceMismatch(message);
        }
        ChainCommunicationError::from_other(value)
    }
}

impl From<k256::ecdsa::Error> for HeliosError {
    fn from(value: k256::ecdsa::Error) -> Self {
        HeliosError::KeyError(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_failures_map_to_core_classes() {
        let stale: ChainCommunicationError = HeliosError::QueryFailed {
            path: "/helios.hyperion.v1.Query/Params".into(),
            code: 26,
            log: "version does not exist: pruned".into(),
        }
        .into();
        assert!(stale.is_stale_endpoint());

        let sequence: ChainCommunicationError = HeliosError::QueryFailed {
            path: "/cosmos.tx.v1beta1.Service/Simulate".into(),
            code: 32,
            log: "account sequence mismatch, expected 12, got 11".into(),
        }
        .into();
        assert!(sequence.is_sequence_mismatch());

        let other: ChainCommunicationError = HeliosError::MissingField("valset").into();
        assert!(!other.is_stale_endpoint());
    }
}
