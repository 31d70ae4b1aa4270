//! Monero key algebra for atomic swaps.
//!
//! Auditor notes:
//! - Uses curve25519-dalek only (Quarkslab audited).
//! - No custom scalar/point arithmetic; sums are plain scalar and point addition.
//! - Private keys are canonical scalars and are zeroized on drop.

mod keys;
mod sum;

pub use keys::{
    derive_view_key, generate_key_pair, PrivateKey, PrivateKeyPair, PublicKey, PublicKeyPair,
    KEY_LEN,
};
pub use sum::{
    sum_private_key_pairs, sum_private_spend_keys, sum_private_view_keys, sum_public_key_pairs,
    sum_public_keys, validate_point,
};
