//! Protocol messages exchanged between the two parties.

use alloy_primitives::{Address as EthAddress, B256};
use serde::{Deserialize, Serialize};
use swap_dleq::{KeyProof, KeyProver, Secp256k1PublicKey};
use xmr_wallet::{Address, PrivateKey, PublicKey};

use crate::error::Result;
use crate::ports::{ContractSwap, SwapId};
use crate::session::CounterpartyKeys;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    SendKeys(SendKeys),
    NotifyLocked {
        swap_id: SwapId,
        swap: ContractSwap,
        tx_hash: B256,
    },
    NotifyXmrLock {
        address: Address,
        tx_id: String,
    },
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendKeys(_) => "send_keys",
            Self::NotifyLocked { .. } => "notify_locked",
            Self::NotifyXmrLock { .. } => "notify_xmr_lock",
        }
    }
}

/// Keys a party hands its counterparty. The private view key is shared so
/// both sides can watch the joint account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendKeys {
    pub public_spend_key: String,
    pub private_view_key: String,
    pub secp256k1_public_key: String,
    /// Hex of the cross-curve proof bytes.
    pub dleq_proof: String,
    pub eth_address: EthAddress,
}

impl SendKeys {
    pub fn from_key_proof(keys: &KeyProof, eth_address: EthAddress) -> Self {
        Self {
            public_spend_key: keys.public_key_pair().spend_key().to_hex(),
            private_view_key: keys.private_key_pair().view_key().to_hex(),
            secp256k1_public_key: keys.secp256k1_public_key().to_hex(),
            dleq_proof: hex::encode(keys.proof_bytes()),
            eth_address,
        }
    }

    /// Decodes the keys and checks the proof binds the asserted secp256k1
    /// key to the asserted spend key. Nothing may be locked before this passes.
    pub fn verify(&self, prover: &dyn KeyProver) -> Result<CounterpartyKeys> {
        let public_spend_key = PublicKey::from_hex(&self.public_spend_key)?;
        let private_view_key = PrivateKey::from_hex(&self.private_view_key)?;
        let proof = hex::decode(self.dleq_proof.trim_start_matches("0x")).map_err(|err| {
            swap_dleq::ProofError::InvalidHex {
                field: "dleq_proof",
                reason: err.to_string(),
            }
        })?;
        let verified =
            prover.verify_keys_and_proof(&proof, &self.secp256k1_public_key, &public_spend_key)?;

        Ok(CounterpartyKeys {
            public_spend_key,
            private_view_key,
            secp256k1: verified.secp256k1,
            eth_address: self.eth_address,
        })
    }
}

impl std::fmt::Debug for SendKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendKeys")
            .field("public_spend_key", &self.public_spend_key)
            .field("secp256k1_public_key", &self.secp256k1_public_key)
            .field("eth_address", &self.eth_address)
            .finish_non_exhaustive()
    }
}

pub(crate) fn secp_commitment(key: &Secp256k1PublicKey) -> B256 {
    B256::from(key.keccak256_commitment())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swap_dleq::{ProofError, SigmaProver};

    use crate::error::SwapError;

    #[test]
    fn verified_keys_match_the_sender() {
        let keys = SigmaProver.generate().unwrap();
        let message = SendKeys::from_key_proof(&keys, EthAddress::repeat_byte(7));
        let counterparty = message.verify(&SigmaProver).unwrap();

        assert_eq!(counterparty.public_spend_key, *keys.public_key_pair().spend_key());
        assert_eq!(counterparty.private_view_key, keys.private_key_pair().view_key().clone());
        assert_eq!(counterparty.secp256k1, keys.secp256k1_public_key());
        assert_eq!(counterparty.eth_address, EthAddress::repeat_byte(7));
    }

    #[test]
    fn swapped_spend_key_is_rejected() {
        let keys = SigmaProver.generate().unwrap();
        let other = SigmaProver.generate().unwrap();
        let mut message = SendKeys::from_key_proof(&keys, EthAddress::ZERO);
        message.public_spend_key = other.public_key_pair().spend_key().to_hex();

        let err = message.verify(&SigmaProver).unwrap_err();
        assert!(matches!(
            err,
            SwapError::Proof(ProofError::KeyMismatch { field: "ed25519" })
        ));
    }

    #[test]
    fn message_json_is_tagged() {
        let keys = SigmaProver.generate().unwrap();
        let message = Message::SendKeys(SendKeys::from_key_proof(&keys, EthAddress::ZERO));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "send_keys");
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }
}
