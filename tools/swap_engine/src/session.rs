use alloy_primitives::{Address as EthAddress, B256, U256};
use serde::{Deserialize, Serialize};
use swap_dleq::{KeyProof, ProofError, Secp256k1PublicKey};
use xmr_wallet::{
    sum_private_key_pairs, sum_private_view_keys, sum_public_key_pairs, Address, CryptoError,
    Network, PrivateKey, PrivateKeyPair, PublicKey, PublicKeyPair,
};

use crate::db::RecoveryRecord;
use crate::error::{Result, SwapError};
use crate::ports::{ContractSwap, SwapId};
use crate::role::RoleKind;
use crate::state::Stage;

/// What the two parties agreed to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTerms {
    /// Identifies the deal before a contract swap id exists.
    pub offer_id: B256,
    /// Contract-chain amount in wei (or token base units).
    pub eth_value: U256,
    /// Privacy-coin amount in piconero.
    pub xmr_amount: u64,
    /// Zero address for ether.
    pub asset: EthAddress,
}

/// The counterparty's half of the joint account, as received and verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CounterpartyRecord", into = "CounterpartyRecord")]
pub struct CounterpartyKeys {
    pub public_spend_key: PublicKey,
    pub private_view_key: PrivateKey,
    pub secp256k1: Secp256k1PublicKey,
    pub eth_address: EthAddress,
}

impl CounterpartyKeys {
    pub fn public_key_pair(&self) -> PublicKeyPair {
        PublicKeyPair::new(self.public_spend_key, self.private_view_key.public_key())
    }
}

#[derive(Serialize, Deserialize)]
struct CounterpartyRecord {
    public_spend_key: String,
    private_view_key: String,
    secp256k1: Secp256k1PublicKey,
    eth_address: EthAddress,
}

impl From<CounterpartyKeys> for CounterpartyRecord {
    fn from(keys: CounterpartyKeys) -> Self {
        Self {
            public_spend_key: keys.public_spend_key.to_hex(),
            private_view_key: keys.private_view_key.to_hex(),
            secp256k1: keys.secp256k1,
            eth_address: keys.eth_address,
        }
    }
}

impl TryFrom<CounterpartyRecord> for CounterpartyKeys {
    type Error = CryptoError;

    fn try_from(record: CounterpartyRecord) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            public_spend_key: PublicKey::from_hex(&record.public_spend_key)?,
            private_view_key: PrivateKey::from_hex(&record.private_view_key)?,
            secp256k1: record.secp256k1,
            eth_address: record.eth_address,
        })
    }
}

/// A monero transfer into the joint account. Recorded before the transfer
/// is sent, so an ambiguous wallet error is never mistaken for no lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmrLock {
    pub address: Address,
    /// Unknown until the wallet confirms the transfer.
    pub tx_id: Option<String>,
}

/// Long waits that run off the session lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Job {
    /// Initiator: waiting for the joint account to be funded and confirmed.
    LockCheck,
    /// Either side: waiting for joint funds to unlock, then sweeping them.
    Sweep,
}

/// Per-party swap aggregate, guarded by the session mutex.
#[derive(Debug)]
pub struct SwapSession {
    pub(crate) role: RoleKind,
    pub(crate) terms: SwapTerms,
    pub(crate) stage: Stage,
    pub(crate) keys: KeyProof,
    pub(crate) counterparty: Option<CounterpartyKeys>,
    pub(crate) swap_id: Option<SwapId>,
    pub(crate) contract: Option<ContractSwap>,
    pub(crate) restore_height: u64,
    /// Destination for swept funds when no deposit address is configured.
    pub(crate) primary_address: Address,
    pub(crate) shared_spend_key: Option<PrivateKey>,
    /// First block that can hold a log of this swap.
    pub(crate) from_block: u64,
    pub(crate) xmr_lock: Option<XmrLock>,
    /// Exit was requested; the session only settles from here.
    pub(crate) exiting: bool,
    pub(crate) job: Option<Job>,
    /// Consecutive transient handler failures, for backoff.
    pub(crate) transient_failures: u32,
}

impl SwapSession {
    pub(crate) fn new(
        role: RoleKind,
        terms: SwapTerms,
        keys: KeyProof,
        restore_height: u64,
        primary_address: Address,
    ) -> Self {
        Self {
            role,
            terms,
            stage: Stage::AwaitingKeys,
            keys,
            counterparty: None,
            swap_id: None,
            contract: None,
            restore_height,
            primary_address,
            shared_spend_key: None,
            from_block: 0,
            xmr_lock: None,
            exiting: false,
            job: None,
            transient_failures: 0,
        }
    }

    pub fn offer_id(&self) -> B256 {
        self.terms.offer_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn terms(&self) -> &SwapTerms {
        &self.terms
    }

    pub fn swap_id(&self) -> Option<SwapId> {
        self.swap_id
    }

    pub(crate) fn counterparty(&self) -> Result<&CounterpartyKeys> {
        self.counterparty
            .as_ref()
            .ok_or(SwapError::ContractMismatch("counterparty keys not received".into()))
    }

    pub(crate) fn contract(&self) -> Result<(SwapId, ContractSwap)> {
        match (self.swap_id, self.contract) {
            (Some(swap_id), Some(swap)) => Ok((swap_id, swap)),
            _ => Err(SwapError::ContractMismatch("no contract swap recorded".into())),
        }
    }

    /// Public keys of the joint account: both spend keys and both view keys summed.
    pub(crate) fn joint_public_keys(&self) -> Result<PublicKeyPair> {
        Ok(sum_public_key_pairs(
            &self.keys.public_key_pair(),
            &self.counterparty()?.public_key_pair(),
        ))
    }

    pub(crate) fn joint_address(&self, network: Network) -> Result<Address> {
        Ok(self.joint_public_keys()?.address(network))
    }

    pub(crate) fn joint_view_key(&self) -> Result<PrivateKey> {
        Ok(sum_private_view_keys(
            self.keys.private_key_pair().view_key(),
            &self.counterparty()?.private_view_key,
        ))
    }

    /// Full joint key pair once the counterparty's spend key is revealed.
    pub(crate) fn joint_private_keys(&self, counterparty_spend: PrivateKey) -> Result<PrivateKeyPair> {
        let counterparty = self.counterparty()?;
        if counterparty_spend.public_key() != counterparty.public_spend_key {
            return Err(SwapError::Proof(ProofError::KeyMismatch { field: "ed25519" }));
        }
        let theirs = PrivateKeyPair::new(counterparty_spend, counterparty.private_view_key.clone());
        Ok(sum_private_key_pairs(&self.keys.private_key_pair(), &theirs))
    }

    pub(crate) fn record(&self) -> RecoveryRecord {
        RecoveryRecord {
            offer_id: self.terms.offer_id,
            role: self.role,
            stage: self.stage,
            terms: self.terms,
            secret: self.keys.secret().to_hex(),
            counterparty: self.counterparty.clone(),
            swap_id: self.swap_id,
            contract: self.contract,
            shared_spend_key: self.shared_spend_key.as_ref().map(PrivateKey::to_hex),
            restore_height: self.restore_height,
            from_block: self.from_block,
            xmr_lock: self.xmr_lock.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swap_dleq::{KeyProver, SigmaProver};
    use xmr_wallet::sum_private_spend_keys;

    use crate::message::SendKeys;

    fn session_pair() -> (SwapSession, KeyProof) {
        let ours = SigmaProver.generate().unwrap();
        let theirs = SigmaProver.generate().unwrap();
        let terms = SwapTerms {
            offer_id: B256::repeat_byte(1),
            eth_value: U256::from(1u64),
            xmr_amount: 1,
            asset: EthAddress::ZERO,
        };
        let primary = ours.public_key_pair().address(Network::Dev);
        let mut session = SwapSession::new(RoleKind::Initiator, terms, ours, 0, primary);
        session.counterparty = Some(
            SendKeys::from_key_proof(&theirs, EthAddress::ZERO)
                .verify(&SigmaProver)
                .unwrap(),
        );
        (session, theirs)
    }

    #[test]
    fn joint_keys_agree_with_joint_address() {
        let (session, theirs) = session_pair();
        let joint = session
            .joint_private_keys(theirs.secret().clone())
            .unwrap();

        assert_eq!(joint.public_key_pair(), session.joint_public_keys().unwrap());
        assert_eq!(
            joint.spend_key(),
            &sum_private_spend_keys(session.keys.secret(), theirs.secret())
        );
        assert_eq!(joint.view_key(), &session.joint_view_key().unwrap());
        assert_eq!(
            joint.address(Network::Stagenet),
            session.joint_address(Network::Stagenet).unwrap()
        );
    }

    #[test]
    fn wrong_revealed_secret_is_rejected() {
        let (session, _) = session_pair();
        let stranger = SigmaProver.generate().unwrap();
        assert!(matches!(
            session.joint_private_keys(stranger.secret().clone()),
            Err(SwapError::Proof(ProofError::KeyMismatch { .. }))
        ));
    }

    #[test]
    fn counterparty_keys_serialize_as_hex() {
        let (session, _) = session_pair();
        let keys = session.counterparty.clone().unwrap();
        let json = serde_json::to_value(&keys).unwrap();
        assert_eq!(json["public_spend_key"], keys.public_spend_key.to_hex());
        let back: CounterpartyKeys = serde_json::from_value(json).unwrap();
        assert_eq!(back, keys);
    }
}
