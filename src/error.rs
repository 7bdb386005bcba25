// src/error.rs
use ethers::types::Address;
use thiserror::Error;

pub type Result<T, E = UserOpError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum UserOpError {
    #[error("Malformed field {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },

    #[error("Empty signature")]
    EmptySignature,

    /// `expected` is the required total length, or the slot size when the
    /// number of signers is not known.
    #[error("Signature length mismatch: got {length} bytes, expected {expected}")]
    SignatureLengthMismatch { length: usize, expected: usize },

    #[error("Signer mismatch at position {position}: expected {expected:?}, recovered {recovered:?}")]
    SignerMismatch {
        position: usize,
        expected: Address,
        recovered: Address,
    },

    #[error("Unrecoverable signature at position {position}: {reason}")]
    UnrecoverableSignature { position: usize, reason: String },

    #[error("Account {0:?} was not instantiated by its initCode")]
    UnresolvedAccount(Address),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("Ethereum provider error: {0}")]
    EthereumProviderError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}
