use std::any::Any;
use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::time::Duration;

use crate::{H160, U256};

/// The result of interacting with a chain.
pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// An "Any"-typed error.
pub trait HyperionCustomError: StdError + Send + Sync + Any {}

impl<E: StdError + Send + Sync + Any> HyperionCustomError for E {}

/// Thin wrapper around a boxed HyperionCustomError; required to satisfy
/// AsDynError implementations. Basically a trait-object adaptor.
#[repr(transparent)]
pub struct HyperionCustomErrorWrapper(Box<dyn HyperionCustomError>);

impl Debug for HyperionCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", AsRef::<dyn HyperionCustomError>::as_ref(&self))
    }
}

impl Display for HyperionCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", AsRef::<dyn HyperionCustomError>::as_ref(&self))
    }
}

impl StdError for HyperionCustomErrorWrapper {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl AsRef<dyn HyperionCustomError> for HyperionCustomErrorWrapper {
    fn as_ref(&self) -> &dyn HyperionCustomError {
        self.0.as_ref()
    }
}

impl Deref for HyperionCustomErrorWrapper {
    type Target = Box<dyn HyperionCustomError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// ChainCommunicationError contains errors returned when attempting to
/// call either chain or dispatch a transaction
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// The RPC pool has no endpoints to call
    #[error("no rpc clients available")]
    NoClients,
    /// A single attempt exceeded its deadline
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The endpoint served stale or pruned state
    #[error("stale endpoint: {0}")]
    StaleEndpoint(String),
    /// The sender nonce is still wrong after one resync
    #[error("nonce mismatch for {sender:?}: {message}")]
    NonceMismatch {
        /// Sender whose nonce is out of sync
        sender: H160,
        /// Last error returned by the node
        message: String,
    },
    /// The same transaction input is already waiting to be mined
    #[error("duplicate-pending: transaction input {0} is already pending")]
    DuplicatePending(String),
    /// Confirmations do not reach the quorum threshold
    #[error("insufficient voting power: {good_power} < {threshold}")]
    InsufficientVotingPower {
        /// Summed power of members with a valid confirmation
        good_power: u64,
        /// Required power
        threshold: u64,
    },
    /// Adjusted gas price exceeds the configured cap
    #[error("gas price {price} exceeds max gas price {max}")]
    GasPriceTooHigh {
        /// Adjusted suggested price
        price: U256,
        /// Configured cap
        max: U256,
    },
    /// The sender can not pay for gas
    #[error("insufficient funds for gas: {0}")]
    InsufficientFunds(String),
    /// The EVM executed and reverted the transaction
    #[error("VM Exception: {0}")]
    VmException(String),
    /// The node rejected the transaction signer
    #[error("invalid sender: {0}")]
    InvalidSender(String),
    /// The home chain returned a non-zero ABCI code
    #[error("home chain tx failed (codespace {codespace}, code {code}): {log}")]
    HomeChainTx {
        /// ABCI code
        code: u32,
        /// Module the code belongs to
        codespace: String,
        /// Raw log returned by the node
        log: String,
    },
    /// The home chain account sequence diverged from the local copy
    #[error("account sequence mismatch: {0}")]
    AccountSequenceMismatch(String),
    /// A valset update must strictly increase the nonce
    #[error("new valset nonce {new} must be greater than current nonce {old}")]
    ValsetNonceNotIncreasing {
        /// Nonce on the counterparty chain
        old: u64,
        /// Nonce of the proposed valset
        new: u64,
    },
    /// The surrounding task was cancelled
    #[error("operation cancelled")]
    Cancelled,
    /// An error with a contract call
    #[error(transparent)]
    ContractError(HyperionCustomErrorWrapper),
    /// Any other error; does not implement `From` to prevent
    /// conflicting/absorbing other errors.
    #[error(transparent)]
    Other(HyperionCustomErrorWrapper),
    /// Error while parsing or converting data
    #[error("parse error: {0}")]
    ParseError(String),
    /// Serde JSON error
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    /// Custom error message
    #[error("{0}")]
    CustomError(String),
}

/// Codes returned by the home chain that must not be retried.
pub const HOME_INSUFFICIENT_FEE_CODE: u32 = 13;

/// Node error fragments that indicate the endpoint is behind or pruned.
const STALE_ENDPOINT_PATTERNS: &[&str] = &[
    "attempt to unmarshal",
    "pruned",
    "failed to get",
    "unknown block",
    "missing trie node",
    "header not found",
];

/// Whether a raw node error message describes a stale endpoint.
pub fn is_stale_endpoint_message(message: &str) -> bool {
    let message = message.to_lowercase();
    STALE_ENDPOINT_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

impl ChainCommunicationError {
    /// Create a chain communication error from any other existing error
    pub fn from_other<E: HyperionCustomError>(err: E) -> Self {
        Self::Other(HyperionCustomErrorWrapper(Box::new(err)))
    }

    /// Create a chain communication error from any other existing error
    pub fn from_other_boxed<E: HyperionCustomError>(err: Box<E>) -> Self {
        Self::Other(HyperionCustomErrorWrapper(err))
    }

    /// Creates a chain communication error of the other error variant from a static string
    pub fn from_other_str(err: &'static str) -> Self {
        #[derive(Debug)]
        #[repr(transparent)]
        struct StringError(&'static str);
        impl Display for StringError {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.0)
            }
        }
        impl StdError for StringError {}

        Self::from_other(StringError(err))
    }

    /// Creates a chain communication error of the contract error variant from any other existing
    /// error
    pub fn from_contract_error<E>(err: E) -> Self
    where
        E: HyperionCustomError,
    {
        Self::ContractError(HyperionCustomErrorWrapper(Box::new(err)))
    }

    /// Whether this error means the endpoint should be rotated and the state re-read.
    pub fn is_stale_endpoint(&self) -> bool {
        match self {
            Self::StaleEndpoint(_) => true,
            Self::ContractError(_) | Self::Other(_) | Self::CustomError(_) => {
                is_stale_endpoint_message(&self.to_string())
            }
            _ => false,
        }
    }

    /// Whether the error is a nonce mismatch that survived the resync.
    pub fn is_nonce_mismatch(&self) -> bool {
        matches!(self, Self::NonceMismatch { .. })
    }

    /// Whether the sender ran out of gas funds.
    pub fn is_insufficient_funds(&self) -> bool {
        match self {
            Self::InsufficientFunds(_) => true,
            other => other.to_string().contains("insufficient funds"),
        }
    }

    /// Whether the home chain rejected the tx for an insufficient fee (code 13).
    pub fn is_insufficient_fee(&self) -> bool {
        matches!(self, Self::HomeChainTx { code, .. } if *code == HOME_INSUFFICIENT_FEE_CODE)
    }

    /// Whether the home chain client must resync its account sequence.
    pub fn is_sequence_mismatch(&self) -> bool {
        matches!(self, Self::AccountSequenceMismatch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_stale_endpoint_messages() {
        assert!(is_stale_endpoint_message(
            "failed to get block: header not found"
        ));
        assert!(is_stale_endpoint_message("Attempt to unmarshal response"));
        assert!(!is_stale_endpoint_message("execution reverted"));

        let err = ChainCommunicationError::CustomError("state is pruned".into());
        assert!(err.is_stale_endpoint());
        assert!(!ChainCommunicationError::NoClients.is_stale_endpoint());
    }

    #[test]
    fn insufficient_fee_is_code_13() {
        let err = ChainCommunicationError::HomeChainTx {
            code: 13,
            codespace: "sdk".into(),
            log: "insufficient fee".into(),
        };
        assert!(err.is_insufficient_fee());

        let err = ChainCommunicationError::HomeChainTx {
            code: 32,
            codespace: "sdk".into(),
            log: "sequence".into(),
        };
        assert!(!err.is_insufficient_fee());
    }
}
