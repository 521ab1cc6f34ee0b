//! Error types for the transaction layer

use crate::chain::{ChainKind, ProviderError};
use crate::rlp::RlpError;

use thiserror::Error;

/// Broad failure classes, used by callers to decide what to do with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing was sent to the network
    Validation,
    /// The provider failed for a reason other than "not found"
    Network,
    /// Hex, length or canonical-encoding problems in key, hash or signature material
    Encoding,
    /// A transaction was handed to a client of another chain family
    TypeMismatch,
    /// The caller abandoned a confirmation wait
    Cancelled,
}

/// Main error type for transaction operations
#[derive(Error, Debug)]
pub enum TxError {
    #[error("Transaction sender not set")]
    MissingSender,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("Method {0} not found in contract ABI")]
    MethodNotFound(String),

    #[error("Invalid contract ABI: {0}")]
    InvalidAbi(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("No private key configured")]
    MissingPrivateKey,

    #[error("Fee not resolved: {0} is zero")]
    FeeUnresolved(&'static str),

    #[error("Transaction is already signed")]
    AlreadySigned,

    #[error("Transaction is not signed")]
    NotSigned,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidHash(String),

    #[error("ABI encoding error: {0}")]
    Abi(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Canonical encoding error: {0}")]
    Rlp(#[from] RlpError),

    #[error("Network error: {0}")]
    Network(#[from] ProviderError),

    #[error("Transaction built for {found} cannot be used with a {expected} client")]
    TypeMismatch { expected: ChainKind, found: ChainKind },

    #[error("Wait for transaction {0} cancelled")]
    Cancelled(String),
}

impl TxError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TxError::MissingSender
            | TxError::InvalidAddress { .. }
            | TxError::InvalidChainId(_)
            | TxError::MethodNotFound(_)
            | TxError::InvalidAbi(_)
            | TxError::InvalidKey(_)
            | TxError::MissingPrivateKey
            | TxError::FeeUnresolved(_)
            | TxError::AlreadySigned
            | TxError::NotSigned
            | TxError::Config(_) => ErrorKind::Validation,
            TxError::InvalidSignature(_)
            | TxError::InvalidHash(_)
            | TxError::Abi(_)
            | TxError::Encoding(_)
            | TxError::Rlp(_) => ErrorKind::Encoding,
            TxError::Network(_) => ErrorKind::Network,
            TxError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            TxError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

/// Result type for transaction operations
pub type TxResult<T> = Result<T, TxError>;
