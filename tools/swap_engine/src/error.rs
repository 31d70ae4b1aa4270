use thiserror::Error;

use swap_dleq::ProofError;
use xmr_wallet::{AddressError, CryptoError};

use crate::event::EventKind;
use crate::ports::{ChainError, TransportError, WalletError};
use crate::state::Stage;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("unexpected {event:?} while {stage}")]
    Sequence { stage: Stage, event: EventKind },
    #[error("key proof rejected: {0}")]
    Proof(#[from] ProofError),
    #[error("invalid key material: {0}")]
    Key(#[from] CryptoError),
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
    #[error("locked balance too low: have {observed}, expected {expected}")]
    BalanceTooLow { observed: u64, expected: u64 },
    #[error("lock address mismatch: expected {expected}, got {got}")]
    AddressMismatch { expected: String, got: String },
    #[error("contract does not match the agreed swap: {0}")]
    ContractMismatch(String),
    #[error("deadline passed: {0}")]
    Deadline(&'static str),
    #[error("{0} is not permitted for this role")]
    NotPermitted(&'static str),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("recovery store: {0:#}")]
    Store(#[from] anyhow::Error),
    #[error("nothing to recover yet: {0}")]
    NothingToRecover(&'static str),
    #[error("swap cancelled")]
    Cancelled,
    #[error("exit did not complete, finish the swap through recovery: {0}")]
    NeedsRecovery(Box<SwapError>),
}

impl SwapError {
    /// Errors after which the session must be resolved through exit.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Cancelled | Self::Store(_) | Self::NeedsRecovery(_)
        )
    }

    /// Failed chain or wallet reads. Another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Chain(ChainError::Rpc(_)) | Self::Wallet(WalletError::Rpc(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, SwapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rpc_failures_are_transient() {
        assert!(SwapError::Chain(ChainError::Rpc("timeout".into())).is_transient());
        assert!(SwapError::Wallet(WalletError::Rpc("connection reset".into())).is_transient());
        assert!(!SwapError::Chain(ChainError::TransactionFailed("nonce too low".into())).is_transient());
        assert!(!SwapError::Wallet(WalletError::NotOpen).is_transient());
        assert!(!SwapError::Deadline("t0").is_transient());
    }

    #[test]
    fn recovery_handoff_is_not_fatal_again() {
        let err = SwapError::NeedsRecovery(Box::new(SwapError::Chain(ChainError::Reverted(
            "refund must be called by the swap owner".into(),
        ))));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("recovery"));
    }
}
