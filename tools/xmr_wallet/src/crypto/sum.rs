use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};

use crate::crypto::keys::{PrivateKey, PrivateKeyPair, PublicKey, PublicKeyPair};
use crate::types::CryptoError;

/// Joint spend key: s_ab = s_a + s_b.
pub fn sum_private_spend_keys(a: &PrivateKey, b: &PrivateKey) -> PrivateKey {
    PrivateKey::from_scalar(a.as_scalar() + b.as_scalar())
}

/// Joint view key: v_ab = v_a + v_b.
pub fn sum_private_view_keys(a: &PrivateKey, b: &PrivateKey) -> PrivateKey {
    PrivateKey::from_scalar(a.as_scalar() + b.as_scalar())
}

pub fn sum_public_keys(a: &PublicKey, b: &PublicKey) -> PublicKey {
    PublicKey::from_point(a.point() + b.point())
}

/// Component-wise sum of both parties' private pairs.
pub fn sum_private_key_pairs(a: &PrivateKeyPair, b: &PrivateKeyPair) -> PrivateKeyPair {
    PrivateKeyPair::new(
        sum_private_spend_keys(a.spend_key(), b.spend_key()),
        sum_private_view_keys(a.view_key(), b.view_key()),
    )
}

/// Component-wise sum of both parties' public pairs; this is the joint account.
pub fn sum_public_key_pairs(a: &PublicKeyPair, b: &PublicKeyPair) -> PublicKeyPair {
    PublicKeyPair::new(
        sum_public_keys(a.spend_key(), b.spend_key()),
        sum_public_keys(a.view_key(), b.view_key()),
    )
}

/// Validates an Ed25519 point and rejects small-order points.
pub fn validate_point(compressed: &[u8; 32]) -> Result<EdwardsPoint, CryptoError> {
    let point = CompressedEdwardsY(*compressed)
        .decompress()
        .ok_or(CryptoError::InvalidPoint)?;

    // decompress reduces y mod p and accepts a sign bit on x = 0
    if point.compress().as_bytes() != compressed {
        return Err(CryptoError::NonCanonicalPoint);
    }

    if point.is_small_order() {
        return Err(CryptoError::SmallOrderPoint);
    }

    Ok(point)
}
