//! Collaborator seams the swap machine is written against.
//!
//! Each port is an object-safe async trait so sessions can hold
//! `Arc<dyn Port>` and tests can swap in the in-process adapters.

mod contract;
mod transport;
mod wallet;

pub use contract::{
    ChainError, ContractClient, ContractStage, ContractSwap, LockReceipt, LockRequest, LogKind,
    SwapId, SwapLog, ALREADY_COMPLETED,
};
pub use transport::{Transport, TransportError};
pub use wallet::{WalletClient, WalletError, WalletGuard};
