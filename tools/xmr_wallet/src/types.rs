use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid compressed point")]
    InvalidPoint,
    #[error("small-order point")]
    SmallOrderPoint,
    #[error("point is not canonically encoded")]
    NonCanonicalPoint,
    #[error("scalar is not canonically reduced")]
    NonCanonicalScalar,
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid monero address length: expected {expected}, got {got}")]
    Length { expected: usize, got: usize },
    #[error("invalid monero address encoding")]
    Encoding,
    #[error("invalid address checksum")]
    Checksum,
    #[error("monero address has unknown network prefix {0}")]
    UnknownPrefix(u8),
    #[error("invalid monero address: expected {expected}, got {got}")]
    NetworkMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error(transparent)]
    Key(#[from] CryptoError),
}

#[derive(Debug, Error)]
pub enum XmrWalletError {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, XmrWalletError>;

/// Balance of account 0, in piconero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub total: u64,
    pub unlocked: u64,
    pub blocks_to_unlock: u64,
}
