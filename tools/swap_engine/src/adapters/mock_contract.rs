use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{keccak256, Address as EthAddress, B256, U256};
use async_trait::async_trait;
use swap_dleq::commitment_from_secret;
use tokio::sync::Mutex;

use crate::ports::{
    ChainError, ContractClient, ContractStage, ContractSwap, LockReceipt, LockRequest, LogKind,
    SwapId, SwapLog, ALREADY_COMPLETED,
};

#[derive(Default)]
struct ChainState {
    now: u64,
    tx_count: u64,
    swaps: HashMap<SwapId, (ContractSwap, ContractStage)>,
    logs: Vec<SwapLog>,
    payouts: HashMap<EthAddress, U256>,
}

impl ChainState {
    fn next_tx(&mut self) -> B256 {
        self.tx_count += 1;
        keccak256(self.tx_count.to_be_bytes())
    }

    fn live_swap(&self, swap: &ContractSwap) -> Result<(SwapId, ContractStage), ChainError> {
        let swap_id = swap.swap_id();
        match self.swaps.get(&swap_id) {
            None => Err(ChainError::Reverted("invalid swap".into())),
            Some((_, ContractStage::Completed)) => {
                Err(ChainError::Reverted(ALREADY_COMPLETED.into()))
            }
            Some((_, stage)) => Ok((swap_id, *stage)),
        }
    }

    fn complete(
        &mut self,
        swap_id: SwapId,
        kind: LogKind,
        secret: [u8; 32],
        payee: EthAddress,
        value: U256,
    ) -> B256 {
        if let Some(entry) = self.swaps.get_mut(&swap_id) {
            entry.1 = ContractStage::Completed;
        }
        *self.payouts.entry(payee).or_default() += value;
        let tx_hash = self.next_tx();
        self.logs.push(SwapLog {
            kind,
            swap_id,
            secret: Some(secret),
            tx_hash,
            block_number: self.tx_count,
        });
        tx_hash
    }
}

/// In-process swap creator contract with its own clock.
///
/// Every handle shares one chain; [`MockContract::connect`] gives another
/// party its own sender address. Each transaction mines one block, so the
/// block number is the transaction count.
#[derive(Clone)]
pub struct MockContract {
    chain: Arc<Mutex<ChainState>>,
    sender: EthAddress,
}

impl MockContract {
    pub fn new(sender: EthAddress, now: u64) -> Self {
        Self {
            chain: Arc::new(Mutex::new(ChainState {
                now,
                ..ChainState::default()
            })),
            sender,
        }
    }

    pub fn connect(&self, sender: EthAddress) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            sender,
        }
    }

    pub async fn set_time(&self, now: u64) {
        self.chain.lock().await.now = now;
    }

    pub async fn advance(&self, seconds: u64) {
        self.chain.lock().await.now += seconds;
    }

    /// Total paid out to `address` by claims and refunds.
    pub async fn paid_to(&self, address: EthAddress) -> U256 {
        self.chain
            .lock()
            .await
            .payouts
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    pub async fn logs(&self, kind: LogKind) -> Vec<SwapLog> {
        self.chain
            .lock()
            .await
            .logs
            .iter()
            .filter(|log| log.kind == kind)
            .copied()
            .collect()
    }
}

#[async_trait]
impl ContractClient for MockContract {
    fn address(&self) -> EthAddress {
        self.sender
    }

    async fn new_swap(&self, request: &LockRequest) -> Result<LockReceipt, ChainError> {
        if request.value.is_zero() {
            return Err(ChainError::Reverted("value must not be zero".into()));
        }
        let mut chain = self.chain.lock().await;
        let timeout_0 = chain.now + request.timeout_duration_0;
        let swap = ContractSwap {
            owner: self.sender,
            claimer: request.claimer,
            claim_commitment: request.claim_commitment,
            refund_commitment: request.refund_commitment,
            timeout_0,
            timeout_1: timeout_0 + request.timeout_duration_1,
            asset: request.asset,
            value: request.value,
            nonce: request.nonce,
        };
        let swap_id = swap.swap_id();
        if chain.swaps.contains_key(&swap_id) {
            return Err(ChainError::Reverted("swap already exists".into()));
        }
        chain.swaps.insert(swap_id, (swap, ContractStage::Pending));
        let tx_hash = chain.next_tx();
        Ok(LockReceipt {
            swap_id,
            swap,
            tx_hash,
            block_number: chain.tx_count,
        })
    }

    async fn set_ready(&self, swap: &ContractSwap) -> Result<B256, ChainError> {
        let mut chain = self.chain.lock().await;
        let (swap_id, stage) = chain.live_swap(swap)?;
        if swap.owner != self.sender {
            return Err(ChainError::Reverted("only the swap owner can call setReady".into()));
        }
        if stage != ContractStage::Pending {
            return Err(ChainError::Reverted("swap is not in PENDING stage".into()));
        }
        if let Some(entry) = chain.swaps.get_mut(&swap_id) {
            entry.1 = ContractStage::Ready;
        }
        let tx_hash = chain.next_tx();
        let block_number = chain.tx_count;
        chain.logs.push(SwapLog {
            kind: LogKind::Ready,
            swap_id,
            secret: None,
            tx_hash,
            block_number,
        });
        Ok(tx_hash)
    }

    async fn claim(&self, swap: &ContractSwap, secret: [u8; 32]) -> Result<B256, ChainError> {
        let mut chain = self.chain.lock().await;
        let (swap_id, stage) = chain.live_swap(swap)?;
        if swap.claimer != self.sender {
            return Err(ChainError::Reverted("only claimer can claim!".into()));
        }
        if chain.now < swap.timeout_0 && stage != ContractStage::Ready {
            return Err(ChainError::Reverted("too early to claim!".into()));
        }
        if chain.now >= swap.timeout_1 {
            return Err(ChainError::Reverted("too late to claim!".into()));
        }
        check_secret(&secret, swap.claim_commitment)?;
        Ok(chain.complete(swap_id, LogKind::Claimed, secret, swap.claimer, swap.value))
    }

    async fn refund(&self, swap: &ContractSwap, secret: [u8; 32]) -> Result<B256, ChainError> {
        let mut chain = self.chain.lock().await;
        let (swap_id, stage) = chain.live_swap(swap)?;
        if swap.owner != self.sender {
            return Err(ChainError::Reverted("refund must be called by the swap owner".into()));
        }
        let open = chain.now >= swap.timeout_1
            || (chain.now < swap.timeout_0 && stage != ContractStage::Ready);
        if !open {
            return Err(ChainError::Reverted(
                "it's the counterparty's turn, unable to refund, try again later".into(),
            ));
        }
        check_secret(&secret, swap.refund_commitment)?;
        Ok(chain.complete(swap_id, LogKind::Refunded, secret, swap.owner, swap.value))
    }

    async fn stage(&self, swap_id: SwapId) -> Result<ContractStage, ChainError> {
        Ok(self
            .chain
            .lock()
            .await
            .swaps
            .get(&swap_id)
            .map(|(_, stage)| *stage)
            .unwrap_or(ContractStage::Invalid))
    }

    async fn block_timestamp(&self) -> Result<u64, ChainError> {
        Ok(self.chain.lock().await.now)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.chain.lock().await.tx_count)
    }

    async fn filter_logs(
        &self,
        kind: LogKind,
        swap_id: SwapId,
        from_block: u64,
    ) -> Result<Vec<SwapLog>, ChainError> {
        Ok(self
            .chain
            .lock()
            .await
            .logs
            .iter()
            .filter(|log| log.kind == kind && log.swap_id == swap_id)
            .filter(|log| log.block_number >= from_block)
            .copied()
            .collect())
    }
}

fn check_secret(secret: &[u8; 32], commitment: B256) -> Result<(), ChainError> {
    let computed = commitment_from_secret(secret)
        .map_err(|err| ChainError::Reverted(format!("invalid secret: {err}")))?;
    if B256::from(computed) != commitment {
        return Err(ChainError::Reverted("secret does not match commitment".into()));
    }
    Ok(())
}
