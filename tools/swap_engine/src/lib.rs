//! ETH/XMR atomic swap engine.
//!
//! One [`Swap`] per offer drives either side of the protocol: the initiator
//! locks ether (or a token) in the swap creator contract, the responder locks
//! monero into an account whose spend key is the sum of both parties' secrets.
//! Claiming on the contract chain reveals the claimer's secret, refunding
//! reveals the owner's, and whichever is revealed lets the other side sweep
//! the joint monero account.
//!
//! Chain, wallet, peer transport and the recovery store are ports (see
//! [`ports`]); [`adapters`] has live clients and in-process doubles.

mod actions;
pub mod adapters;
pub mod config;
pub mod db;
mod error;
mod event;
mod initiator;
mod machine;
mod message;
pub mod metrics;
pub mod ports;
mod recovery;
mod responder;
mod role;
mod session;
mod state;
mod watcher;

pub use config::{RefundMargin, SwapConfig, MIN_REFUND_MARGIN};
pub use db::{JsonFileStore, MemoryStore, RecoveryRecord, RecoveryStore};
pub use error::{Result, SwapError};
pub use event::{Event, EventKind};
pub use machine::{Swap, SwapContext};
pub use message::{Message, SendKeys};
pub use recovery::{recover, recover_from_store, RecoveryOutcome, RecoveryRequest};
pub use role::{ContractCall, Initiator, Responder, Role, RoleKind};
pub use session::{CounterpartyKeys, SwapSession, SwapTerms, XmrLock};
pub use state::Stage;
