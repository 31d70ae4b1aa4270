//! Cross-curve key proofs for ETH/XMR swaps.
//!
//! A swap secret is one integer below 2^252. On secp256k1 it is the scalar
//! whose public key is committed on the contract chain; on ed25519 it is the
//! party's Monero spend key. The proof shows both public keys share it.

mod proof;
mod secp;

pub use proof::{
    generate_keys_and_proof, verify, verify_keys_and_proof, KeyProof, KeyProver, SigmaProver,
    VerifiedKeys,
};
pub use secp::{
    commitment_from_secret, secret_from_contract_bytes, secret_to_contract_bytes,
    Secp256k1PublicKey,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// The proof does not bind the two public keys to one secret.
    ProofInvalid,
    /// A verified key differs from the one the counterparty asserted.
    KeyMismatch { field: &'static str },
    InvalidHex { field: &'static str, reason: String },
    InvalidLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    InvalidPoint { field: &'static str },
    /// Secret bytes that are zero or not a canonical scalar on both curves.
    InvalidSecret,
    Encoding(String),
}

impl std::fmt::Display for ProofError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProofError::ProofInvalid => write!(f, "cross-curve proof failed to verify"),
            ProofError::KeyMismatch { field } => {
                write!(f, "{field} public key does not match the asserted key")
            }
            ProofError::InvalidHex { field, reason } => {
                write!(f, "invalid hex for {field}: {reason}")
            }
            ProofError::InvalidLength {
                field,
                expected,
                got,
            } => write!(f, "invalid length for {field}: expected {expected}, got {got}"),
            ProofError::InvalidPoint { field } => write!(f, "invalid point encoding: {field}"),
            ProofError::InvalidSecret => write!(f, "secret is not a valid scalar on both curves"),
            ProofError::Encoding(reason) => write!(f, "malformed proof encoding: {reason}"),
        }
    }
}

impl std::error::Error for ProofError {}

fn decode_hex(value: &str, field: &'static str) -> Result<Vec<u8>, ProofError> {
    hex::decode(value.trim().trim_start_matches("0x")).map_err(|err| ProofError::InvalidHex {
        field,
        reason: err.to_string(),
    })
}

fn decode_hex_array<const N: usize>(value: &str, field: &'static str) -> Result<[u8; N], ProofError> {
    let bytes = decode_hex(value, field)?;
    bytes.as_slice().try_into().map_err(|_| ProofError::InvalidLength {
        field,
        expected: N,
        got: bytes.len(),
    })
}
