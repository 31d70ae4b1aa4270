use alloy::sol;
use alloy::sol_types::SolValue;
use alloy_primitives::{keccak256, Address as EthAddress, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// keccak256 of the ABI-encoded [`ContractSwap`].
pub type SwapId = B256;

/// Revert reason of any call on a completed swap.
pub const ALREADY_COMPLETED: &str = "swap is already completed";

sol! {
    struct SwapRecord {
        address owner;
        address claimer;
        bytes32 claimCommitment;
        bytes32 refundCommitment;
        uint256 timeout0;
        uint256 timeout1;
        address asset;
        uint256 value;
        uint256 nonce;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("malformed log: {0}")]
    Log(String),
}

impl From<anyhow::Error> for ChainError {
    fn from(err: anyhow::Error) -> Self {
        Self::Rpc(format!("{err:#}"))
    }
}

impl ChainError {
    /// The counterparty (or an earlier attempt) already completed the swap.
    pub fn is_already_completed(&self) -> bool {
        match self {
            Self::Reverted(reason) | Self::TransactionFailed(reason) | Self::Rpc(reason) => {
                reason.contains(ALREADY_COMPLETED)
            }
            Self::Log(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStage {
    Invalid,
    Pending,
    Ready,
    Completed,
}

impl ContractStage {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Pending,
            2 => Self::Ready,
            3 => Self::Completed,
            _ => Self::Invalid,
        }
    }
}

/// The on-chain swap record. Immutable once the lock receipt is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSwap {
    pub owner: EthAddress,
    pub claimer: EthAddress,
    pub claim_commitment: B256,
    pub refund_commitment: B256,
    /// t0
    pub timeout_0: u64,
    /// t1
    pub timeout_1: u64,
    /// Zero address for ether.
    pub asset: EthAddress,
    pub value: U256,
    pub nonce: U256,
}

impl ContractSwap {
    pub fn swap_id(&self) -> SwapId {
        keccak256(self.to_record().abi_encode())
    }

    pub(crate) fn to_record(&self) -> SwapRecord {
        SwapRecord {
            owner: self.owner,
            claimer: self.claimer,
            claimCommitment: self.claim_commitment,
            refundCommitment: self.refund_commitment,
            timeout0: U256::from(self.timeout_0),
            timeout1: U256::from(self.timeout_1),
            asset: self.asset,
            value: self.value,
            nonce: self.nonce,
        }
    }
}

/// Arguments of `newSwap`; the contract turns the durations into t0 and t1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequest {
    pub claim_commitment: B256,
    pub refund_commitment: B256,
    pub claimer: EthAddress,
    pub timeout_duration_0: u64,
    pub timeout_duration_1: u64,
    pub asset: EthAddress,
    pub value: U256,
    pub nonce: U256,
}

/// Swap record as read back from the lock receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockReceipt {
    pub swap_id: SwapId,
    pub swap: ContractSwap,
    pub tx_hash: B256,
    /// Block the swap was created in; no log of this swap can be older.
    pub block_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Ready,
    Claimed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapLog {
    pub kind: LogKind,
    pub swap_id: SwapId,
    /// Revealed secret, big-endian; absent on `Ready`.
    pub secret: Option<[u8; 32]>,
    pub tx_hash: B256,
    pub block_number: u64,
}

/// Contract-chain client. Mutating calls return once the receipt is in.
#[async_trait]
pub trait ContractClient: Send + Sync {
    /// Address transactions are sent from.
    fn address(&self) -> EthAddress;

    async fn new_swap(&self, request: &LockRequest) -> Result<LockReceipt, ChainError>;

    async fn set_ready(&self, swap: &ContractSwap) -> Result<B256, ChainError>;

    async fn claim(&self, swap: &ContractSwap, secret: [u8; 32]) -> Result<B256, ChainError>;

    async fn refund(&self, swap: &ContractSwap, secret: [u8; 32]) -> Result<B256, ChainError>;

    async fn stage(&self, swap_id: SwapId) -> Result<ContractStage, ChainError>;

    /// Timestamp of the latest block. Every deadline is compared against this.
    async fn block_timestamp(&self) -> Result<u64, ChainError>;

    /// Height of the latest block.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// `kind` logs of `swap_id` mined at or after `from_block`.
    async fn filter_logs(
        &self,
        kind: LogKind,
        swap_id: SwapId,
        from_block: u64,
    ) -> Result<Vec<SwapLog>, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContractSwap {
        ContractSwap {
            owner: EthAddress::repeat_byte(0x11),
            claimer: EthAddress::repeat_byte(0x22),
            claim_commitment: B256::repeat_byte(0x33),
            refund_commitment: B256::repeat_byte(0x44),
            timeout_0: 1_000,
            timeout_1: 2_000,
            asset: EthAddress::ZERO,
            value: U256::from(5u64),
            nonce: U256::from(9u64),
        }
    }

    #[test]
    fn swap_id_hashes_the_static_encoding() {
        let swap = sample();
        let encoded = swap.to_record().abi_encode();
        // nine static words
        assert_eq!(encoded.len(), 9 * 32);
        assert_eq!(&encoded[12..32], swap.owner.as_slice());
        assert_eq!(&encoded[64..96], swap.claim_commitment.as_slice());
        assert_eq!(U256::from_be_slice(&encoded[128..160]), U256::from(1_000u64));
        assert_eq!(swap.swap_id(), keccak256(&encoded));
    }

    #[test]
    fn swap_id_depends_on_nonce() {
        let swap = sample();
        let mut other = swap;
        other.nonce = U256::from(10u64);
        assert_ne!(swap.swap_id(), other.swap_id());
    }

    #[test]
    fn recognizes_benign_revert() {
        assert!(ChainError::Reverted(ALREADY_COMPLETED.to_string()).is_already_completed());
        assert!(ChainError::Rpc(format!("execution reverted: {ALREADY_COMPLETED}"))
            .is_already_completed());
        assert!(!ChainError::Reverted("too early to claim!".into()).is_already_completed());
    }

    #[test]
    fn stage_from_contract_value() {
        assert_eq!(ContractStage::from_u8(0), ContractStage::Invalid);
        assert_eq!(ContractStage::from_u8(2), ContractStage::Ready);
        assert_eq!(ContractStage::from_u8(3), ContractStage::Completed);
        assert_eq!(ContractStage::from_u8(9), ContractStage::Invalid);
    }
}
