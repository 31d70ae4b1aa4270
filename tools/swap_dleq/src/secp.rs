use std::fmt;

use conquer_once::Lazy;
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use xmr_wallet::PrivateKey;

use crate::{decode_hex, ProofError};

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Contract-chain public key of a swap secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secp256k1PublicKey(PublicKey);

impl Secp256k1PublicKey {
    /// Accepts compressed (33) or uncompressed (65) SEC1 encodings.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.len() != 33 && bytes.len() != 65 {
            return Err(ProofError::InvalidLength {
                field: "secp256k1",
                expected: 33,
                got: bytes.len(),
            });
        }
        PublicKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| ProofError::InvalidPoint { field: "secp256k1" })
    }

    pub fn from_hex(value: &str) -> Result<Self, ProofError> {
        Self::from_bytes(&decode_hex(value, "secp256k1")?)
    }

    /// Public key of big-endian secret bytes as they appear on chain.
    pub fn from_secret(secret_be: &[u8; 32]) -> Result<Self, ProofError> {
        let secret = SecretKey::from_slice(secret_be).map_err(|_| ProofError::InvalidSecret)?;
        Ok(Self(PublicKey::from_secret_key(&*SECP, &secret)))
    }

    pub fn to_bytes(&self) -> [u8; 33] {
        self.0.serialize()
    }

    /// Compressed hex, the canonical string form compared during verification.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// keccak256 of the 64-byte uncompressed point (without the 0x04 tag),
    /// the value the contract stores as a claim or refund commitment.
    pub fn keccak256_commitment(&self) -> [u8; 32] {
        let uncompressed = self.0.serialize_uncompressed();
        Keccak256::digest(&uncompressed[1..]).into()
    }
}

impl fmt::Debug for Secp256k1PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secp256k1PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for Secp256k1PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Secp256k1PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Secp256k1PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Commitment of a secret given in contract (big-endian) byte order.
pub fn commitment_from_secret(secret_be: &[u8; 32]) -> Result<[u8; 32], ProofError> {
    Ok(Secp256k1PublicKey::from_secret(secret_be)?.keccak256_commitment())
}

/// ed25519 scalars are little-endian; the contract takes the same integer big-endian.
pub fn secret_to_contract_bytes(secret: &PrivateKey) -> [u8; 32] {
    let mut bytes = secret.to_bytes();
    bytes.reverse();
    bytes
}

/// Inverse of [`secret_to_contract_bytes`]; the integer must be canonical mod l.
pub fn secret_from_contract_bytes(secret_be: &[u8; 32]) -> Result<PrivateKey, ProofError> {
    let mut bytes = *secret_be;
    bytes.reverse();
    PrivateKey::from_bytes(bytes).map_err(|_| ProofError::InvalidSecret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endianness_round_trip() {
        let mut le = [0u8; 32];
        le[0] = 0x01;
        le[30] = 0xab;
        let secret = PrivateKey::from_bytes(le).unwrap();
        let be = secret_to_contract_bytes(&secret);
        assert_eq!(be[31], 0x01);
        assert_eq!(be[1], 0xab);
        assert_eq!(secret_from_contract_bytes(&be).unwrap(), secret);
    }

    #[test]
    fn rejects_zero_and_oversized_secrets() {
        assert_eq!(
            commitment_from_secret(&[0u8; 32]),
            Err(ProofError::InvalidSecret)
        );
        assert_eq!(
            secret_from_contract_bytes(&[0xff; 32]),
            Err(ProofError::InvalidSecret)
        );
    }

    #[test]
    fn commitment_hashes_uncompressed_point() {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = Secp256k1PublicKey::from_secret(&secret).unwrap();
        // 1*G
        assert_eq!(
            key.to_hex(),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        let uncompressed = key.0.serialize_uncompressed();
        let expected: [u8; 32] = Keccak256::digest(&uncompressed[1..]).into();
        assert_eq!(key.keccak256_commitment(), expected);
        assert_eq!(commitment_from_secret(&secret).unwrap(), expected);
    }

    #[test]
    fn parses_both_encodings() {
        let mut secret = [0u8; 32];
        secret[31] = 7;
        let key = Secp256k1PublicKey::from_secret(&secret).unwrap();
        let uncompressed = key.0.serialize_uncompressed();
        assert_eq!(Secp256k1PublicKey::from_bytes(&uncompressed).unwrap(), key);
        assert_eq!(Secp256k1PublicKey::from_hex(&key.to_hex()).unwrap(), key);
        assert!(matches!(
            Secp256k1PublicKey::from_bytes(&[2u8; 32]),
            Err(ProofError::InvalidLength { got: 32, .. })
        ));
    }
}
