use std::fmt;

use conquer_once::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sigma_fun::ed25519::curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use sigma_fun::ed25519::curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use sigma_fun::ed25519::curve25519_dalek::scalar::Scalar;
use sigma_fun::ext::dl_secp256k1_ed25519_eq::{CrossCurveDLEQ, CrossCurveDLEQProof};
use sigma_fun::secp256k1::fun::Point;
use sigma_fun::HashTranscript;
use xmr_wallet::{PrivateKey, PrivateKeyPair, PublicKey, PublicKeyPair};
use zeroize::Zeroize;

use crate::secp::{commitment_from_secret, secret_to_contract_bytes, Secp256k1PublicKey};
use crate::{decode_hex_array, ProofError};

type Transcript = HashTranscript<Sha256, ChaCha20Rng>;

static CROSS_CURVE_PROOF_SYSTEM: Lazy<CrossCurveDLEQ<Transcript>> = Lazy::new(|| {
    CrossCurveDLEQ::<Transcript>::new(
        (*sigma_fun::secp256k1::fun::G).normalize(),
        ED25519_BASEPOINT_POINT,
    )
});

/// Wire form of a proof: both public keys plus the sigma_fun proof.
#[derive(Serialize, Deserialize)]
struct ProofEnvelope {
    secp256k1: String,
    ed25519: String,
    proof: CrossCurveDLEQProof,
}

/// One party's swap secret, its public keys on both curves and the proof
/// binding them. The secret doubles as the Monero spend key.
#[derive(Clone)]
pub struct KeyProof {
    secret: PrivateKey,
    secp256k1: Secp256k1PublicKey,
    public_keys: PublicKeyPair,
    proof: Vec<u8>,
}

impl KeyProof {
    pub fn secret(&self) -> &PrivateKey {
        &self.secret
    }

    /// Spend key = secret, view key derived from it.
    pub fn private_key_pair(&self) -> PrivateKeyPair {
        PrivateKeyPair::from_spend_key(self.secret.clone())
    }

    pub fn public_key_pair(&self) -> PublicKeyPair {
        self.public_keys
    }

    pub fn secp256k1_public_key(&self) -> Secp256k1PublicKey {
        self.secp256k1
    }

    pub fn proof_bytes(&self) -> &[u8] {
        &self.proof
    }

    /// The contract commitment for this secret.
    pub fn commitment(&self) -> [u8; 32] {
        self.secp256k1.keccak256_commitment()
    }

    /// Secret as revealed to the contract.
    pub fn contract_secret(&self) -> [u8; 32] {
        secret_to_contract_bytes(&self.secret)
    }
}

impl fmt::Debug for KeyProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProof")
            .field("secp256k1", &self.secp256k1)
            .field("spend_key", self.public_keys.spend_key())
            .finish_non_exhaustive()
    }
}

/// Public keys recovered from a verified proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedKeys {
    pub secp256k1: Secp256k1PublicKey,
    pub ed25519: PublicKey,
}

/// Draws a secret below 2^252 and proves its public keys on both curves.
pub fn generate_keys_and_proof() -> Result<KeyProof, ProofError> {
    let mut bytes = [0u8; 32];
    loop {
        OsRng.fill_bytes(&mut bytes);
        // below 2^252 the integer is canonical on ed25519 and below the secp256k1 order
        bytes[31] &= 0x0f;
        if bytes.iter().any(|byte| *byte != 0) {
            break;
        }
    }
    let result = prove(&bytes);
    bytes.zeroize();
    result
}

fn prove(secret_le: &[u8; 32]) -> Result<KeyProof, ProofError> {
    if secret_le[31] & 0xf0 != 0 || secret_le.iter().all(|byte| *byte == 0) {
        return Err(ProofError::InvalidSecret);
    }
    let secret = PrivateKey::from_bytes(*secret_le).map_err(|_| ProofError::InvalidSecret)?;
    let scalar = Scalar::from_bytes_mod_order(*secret_le);
    let (proof, (secp_point, ed_point)) =
        CROSS_CURVE_PROOF_SYSTEM.prove(&scalar, &mut rand::thread_rng());

    let secp256k1 = Secp256k1PublicKey::from_bytes(&secp_point.to_bytes())?;
    let ed25519 = PublicKey::from_compressed(ed_point.compress().to_bytes())
        .map_err(|_| ProofError::InvalidPoint { field: "ed25519" })?;

    // the committed key must be the one the contract will recompute
    if commitment_from_secret(&secret_to_contract_bytes(&secret))?
        != secp256k1.keccak256_commitment()
    {
        return Err(ProofError::ProofInvalid);
    }

    let envelope = ProofEnvelope {
        secp256k1: secp256k1.to_hex(),
        ed25519: ed25519.to_hex(),
        proof,
    };
    let proof = serde_json::to_vec(&envelope).map_err(|err| ProofError::Encoding(err.to_string()))?;
    let public_keys = PrivateKeyPair::from_spend_key(secret.clone()).public_key_pair();

    Ok(KeyProof {
        secret,
        secp256k1,
        public_keys,
        proof,
    })
}

/// Checks a proof and returns the two public keys it binds.
pub fn verify(proof: &[u8]) -> Result<VerifiedKeys, ProofError> {
    let envelope: ProofEnvelope =
        serde_json::from_slice(proof).map_err(|err| ProofError::Encoding(err.to_string()))?;

    let secp_bytes: [u8; 33] = decode_hex_array(&envelope.secp256k1, "secp256k1")?;
    let secp_point: Point = Point::from_bytes(secp_bytes)
        .ok_or(ProofError::InvalidPoint { field: "secp256k1" })?;
    let ed_bytes: [u8; 32] = decode_hex_array(&envelope.ed25519, "ed25519")?;
    let ed_point: EdwardsPoint = CompressedEdwardsY(ed_bytes)
        .decompress()
        .ok_or(ProofError::InvalidPoint { field: "ed25519" })?;

    if !CROSS_CURVE_PROOF_SYSTEM.verify(&envelope.proof, (secp_point, ed_point)) {
        return Err(ProofError::ProofInvalid);
    }

    Ok(VerifiedKeys {
        secp256k1: Secp256k1PublicKey::from_bytes(&secp_bytes)?,
        ed25519: PublicKey::from_compressed(ed_bytes)
            .map_err(|_| ProofError::InvalidPoint { field: "ed25519" })?,
    })
}

/// Verifies `proof` and checks it proves the keys the counterparty asserted:
/// the secp256k1 key by canonical string and the ed25519 key against the
/// public spend key.
pub fn verify_keys_and_proof(
    proof: &[u8],
    asserted_secp256k1: &str,
    asserted_spend_key: &PublicKey,
) -> Result<VerifiedKeys, ProofError> {
    check_asserted(verify(proof)?, asserted_secp256k1, asserted_spend_key)
}

fn check_asserted(
    keys: VerifiedKeys,
    asserted_secp256k1: &str,
    asserted_spend_key: &PublicKey,
) -> Result<VerifiedKeys, ProofError> {
    if keys.secp256k1.to_hex() != asserted_secp256k1.trim().trim_start_matches("0x") {
        return Err(ProofError::KeyMismatch { field: "secp256k1" });
    }
    if keys.ed25519 != *asserted_spend_key {
        return Err(ProofError::KeyMismatch { field: "ed25519" });
    }
    Ok(keys)
}

/// Proof backend seam.
pub trait KeyProver: Send + Sync {
    fn generate(&self) -> Result<KeyProof, ProofError>;

    fn verify(&self, proof: &[u8]) -> Result<VerifiedKeys, ProofError>;

    fn verify_keys_and_proof(
        &self,
        proof: &[u8],
        asserted_secp256k1: &str,
        asserted_spend_key: &PublicKey,
    ) -> Result<VerifiedKeys, ProofError> {
        check_asserted(self.verify(proof)?, asserted_secp256k1, asserted_spend_key)
    }
}

/// Pure-Rust prover over sigma_fun.
#[derive(Debug, Clone, Copy, Default)]
pub struct SigmaProver;

impl KeyProver for SigmaProver {
    fn generate(&self) -> Result<KeyProof, ProofError> {
        generate_keys_and_proof()
    }

    fn verify(&self, proof: &[u8]) -> Result<VerifiedKeys, ProofError> {
        verify(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_secret_proves_expected_keys() {
        let mut secret = [0u8; 32];
        secret[0] = 5;
        let proof = prove(&secret).unwrap();
        let keys = verify(proof.proof_bytes()).unwrap();

        let mut secp_secret = [0u8; 32];
        secp_secret[31] = 5;
        assert_eq!(
            keys.secp256k1,
            Secp256k1PublicKey::from_secret(&secp_secret).unwrap()
        );
        assert_eq!(keys.ed25519, proof.secret().public_key());
    }

    #[test]
    fn out_of_range_secrets_are_rejected() {
        assert_eq!(prove(&[0u8; 32]).unwrap_err(), ProofError::InvalidSecret);
        let mut wide = [1u8; 32];
        wide[31] = 0x10;
        assert_eq!(prove(&wide).unwrap_err(), ProofError::InvalidSecret);
    }
}
