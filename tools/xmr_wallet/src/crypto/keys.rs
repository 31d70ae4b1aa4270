use std::fmt;

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use sha3::{Digest, Keccak256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::address::{Address, Network};
use crate::crypto::sum::validate_point;
use crate::types::CryptoError;

pub const KEY_LEN: usize = 32;

/// A private spend or view key, always held as a canonical scalar mod l.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; KEY_LEN]);

impl PrivateKey {
    /// Rejects any encoding that is not already reduced mod l.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Result<Self, CryptoError> {
        let scalar: Option<Scalar> = Scalar::from_canonical_bytes(bytes).into();
        scalar
            .map(Self::from_scalar)
            .ok_or(CryptoError::NonCanonicalScalar)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let fixed: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Self::from_bytes(fixed)
    }

    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = decode_hex(value)?;
        Self::from_slice(&bytes)
    }

    pub fn from_scalar(scalar: Scalar) -> Self {
        Self(scalar.to_bytes())
    }

    /// Reduces arbitrary bytes mod l. Only used on hash outputs.
    pub fn from_bytes_mod_order(bytes: [u8; KEY_LEN]) -> Self {
        Self::from_scalar(Scalar::from_bytes_mod_order(bytes))
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let key = Self::from_bytes_mod_order(bytes);
        bytes.zeroize();
        key
    }

    pub fn as_scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.0)
    }

    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(ED25519_BASEPOINT_POINT * self.as_scalar())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// `view = reduce(keccak256(spend))`, the standard Monero view key derivation.
pub fn derive_view_key(spend_key: &PrivateKey) -> PrivateKey {
    let digest: [u8; KEY_LEN] = Keccak256::digest(spend_key.to_bytes()).into();
    PrivateKey::from_bytes_mod_order(digest)
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(EdwardsPoint);

impl PublicKey {
    pub fn from_compressed(bytes: [u8; KEY_LEN]) -> Result<Self, CryptoError> {
        validate_point(&bytes).map(Self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let fixed: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Self::from_compressed(fixed)
    }

    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = decode_hex(value)?;
        Self::from_slice(&bytes)
    }

    pub(crate) fn from_point(point: EdwardsPoint) -> Self {
        Self(point)
    }

    pub fn point(&self) -> &EdwardsPoint {
        &self.0
    }

    pub fn to_compressed(&self) -> [u8; KEY_LEN] {
        self.0.compress().to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Spend and view private keys of one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateKeyPair {
    spend: PrivateKey,
    view: PrivateKey,
}

impl PrivateKeyPair {
    pub fn new(spend: PrivateKey, view: PrivateKey) -> Self {
        Self { spend, view }
    }

    /// Builds the pair whose view key is derived from the spend key.
    pub fn from_spend_key(spend: PrivateKey) -> Self {
        let view = derive_view_key(&spend);
        Self { spend, view }
    }

    pub fn spend_key(&self) -> &PrivateKey {
        &self.spend
    }

    pub fn view_key(&self) -> &PrivateKey {
        &self.view
    }

    pub fn public_key_pair(&self) -> PublicKeyPair {
        PublicKeyPair::new(self.spend.public_key(), self.view.public_key())
    }

    pub fn address(&self, network: Network) -> Address {
        self.public_key_pair().address(network)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKeyPair {
    spend: PublicKey,
    view: PublicKey,
}

impl PublicKeyPair {
    pub fn new(spend: PublicKey, view: PublicKey) -> Self {
        Self { spend, view }
    }

    pub fn spend_key(&self) -> &PublicKey {
        &self.spend
    }

    pub fn view_key(&self) -> &PublicKey {
        &self.view
    }

    pub fn address(&self, network: Network) -> Address {
        Address::standard(network, self)
    }
}

/// Fresh spend/view pair: seed, sha512, clamp, reduce; the view key is derived
/// from the spend key.
pub fn generate_key_pair() -> PrivateKeyPair {
    let mut seed = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut seed);
    let pair = key_pair_from_seed(&seed);
    seed.zeroize();
    pair
}

pub(crate) fn key_pair_from_seed(seed: &[u8; KEY_LEN]) -> PrivateKeyPair {
    let digest = Sha512::digest(seed);
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&digest[..KEY_LEN]);
    bytes[0] &= 248;
    bytes[31] &= 127;
    bytes[31] |= 64;
    let spend = PrivateKey::from_bytes_mod_order(bytes);
    bytes.zeroize();
    PrivateKeyPair::from_spend_key(spend)
}

fn decode_hex(value: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = value.trim().trim_start_matches("0x");
    hex::decode(trimmed).map_err(|err| CryptoError::InvalidHex(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_canonical_scalar() {
        // l itself is the smallest non-canonical encoding.
        let l = [
            0xed, 0xd3, 0xf5, 0x5c, 0x1a, 0x63, 0x12, 0x58, 0xd6, 0x9c, 0xf7, 0xa2, 0xde, 0xf9,
            0xde, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x10,
        ];
        assert_eq!(
            PrivateKey::from_bytes(l).unwrap_err(),
            CryptoError::NonCanonicalScalar
        );
        assert!(PrivateKey::from_bytes([0xff; 32]).is_err());
    }

    #[test]
    fn hex_round_trip_keeps_key() {
        let key = PrivateKey::random();
        let parsed = PrivateKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed, key);

        let public = key.public_key();
        assert_eq!(PublicKey::from_hex(&public.to_hex()).unwrap(), public);
    }

    #[test]
    fn wrong_length_is_reported() {
        let err = PrivateKey::from_slice(&[1u8; 31]).unwrap_err();
        assert_eq!(err, CryptoError::InvalidLength { expected: 32, got: 31 });
    }

    #[test]
    fn seeded_pair_is_deterministic_and_clamped_before_reduce() {
        let seed = [7u8; 32];
        let a = key_pair_from_seed(&seed);
        let b = key_pair_from_seed(&seed);
        assert_eq!(a, b);
        assert_eq!(a.view_key(), &derive_view_key(a.spend_key()));
    }

    #[test]
    fn debug_does_not_leak_private_scalar() {
        let key = PrivateKey::random();
        assert!(!format!("{key:?}").contains(&key.to_hex()));
    }
}
