//! Monero side of ETH/XMR atomic swaps.
//!
//! Auditor notes:
//! - All curve arithmetic is isolated under `crypto/` and uses curve25519-dalek.
//! - The address codec is self-contained and cross-checked against the `monero` crate.
//! - RPC access is a thin wrapper over `monero-rpc`; only reads are retried.

pub mod address;
pub mod crypto;
pub mod rpc;
pub mod types;
pub mod watcher;

pub use address::{Address, AddressType, Network};
pub use crypto::{
    derive_view_key, generate_key_pair, sum_private_key_pairs, sum_private_spend_keys,
    sum_private_view_keys, sum_public_key_pairs, sum_public_keys, validate_point, PrivateKey,
    PrivateKeyPair, PublicKey, PublicKeyPair,
};
pub use rpc::{retry_with_timeout, RetryConfig, XmrWallet, SPENDABLE_AGE};
pub use types::{AddressError, Balance, CryptoError, Result, XmrWalletError};
pub use watcher::{LockWatcher, WatcherConfig, WatcherEvent};
