use alloy::{
    eips::BlockNumberOrTag,
    network::EthereumWallet,
    primitives::{Address as EthAddress, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolError,
    transports::http::reqwest::Url,
};
use async_trait::async_trait;
use tracing::debug;
use xmr_wallet::{retry_with_timeout, RetryConfig};

use crate::ports::{
    ChainError, ContractClient, ContractStage, ContractSwap, LockReceipt, LockRequest, LogKind,
    SwapId, SwapLog, ALREADY_COMPLETED,
};

sol! {
    #[sol(rpc)]
    contract SwapCreator {
        struct Swap {
            address owner;
            address claimer;
            bytes32 claimCommitment;
            bytes32 refundCommitment;
            uint256 timeout1;
            uint256 timeout2;
            address asset;
            uint256 value;
            uint256 nonce;
        }

        error SwapCompleted();

        event New(
            bytes32 swapID,
            bytes32 claimKey,
            bytes32 refundKey,
            uint256 timeout1,
            uint256 timeout2,
            address asset,
            uint256 value
        );
        event Ready(bytes32 indexed swapID);
        event Claimed(bytes32 indexed swapID, bytes32 indexed s);
        event Refunded(bytes32 indexed swapID, bytes32 indexed s);

        function newSwap(
            bytes32 _claimCommitment,
            bytes32 _refundCommitment,
            address _claimer,
            uint256 _timeoutDuration1,
            uint256 _timeoutDuration2,
            address _asset,
            uint256 _value,
            uint256 _nonce
        ) public payable returns (bytes32);

        function setReady(Swap memory _swap) public;
        function claim(Swap memory _swap, bytes32 _secret) public;
        function refund(Swap memory _swap, bytes32 _secret) public;
        function swaps(bytes32 id) public view returns (uint8);
    }
}

/// Swap creator contract reached over JSON-RPC with a local signer.
///
/// Reads are retried with `ETH_RPC_*` backoff; transactions are sent once.
#[derive(Clone)]
pub struct EthereumContract {
    provider: DynProvider,
    contract: EthAddress,
    sender: EthAddress,
    retry: RetryConfig,
}

impl EthereumContract {
    pub fn new(rpc_url: &str, private_key: &str, contract: EthAddress) -> Result<Self, ChainError> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| ChainError::Rpc(format!("Invalid RPC URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChainError::Rpc(format!(
                "ethereum rpc url must be http or https, got {}",
                url.scheme()
            )));
        }
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| ChainError::Rpc(format!("Invalid private key: {}", e)))?;
        let sender = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = DynProvider::new(ProviderBuilder::new().wallet(wallet).connect_http(url));
        Ok(Self {
            provider,
            contract,
            sender,
            retry: RetryConfig::from_env_prefixed("ETH_RPC"),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn instance(&self) -> SwapCreator::SwapCreatorInstance<&DynProvider> {
        SwapCreator::new(self.contract, &self.provider)
    }

    async fn query_logs(
        &self,
        kind: LogKind,
        swap_id: SwapId,
        from_block: u64,
    ) -> Result<Vec<SwapLog>, ChainError> {
        let instance = self.instance();
        let logs = match kind {
            LogKind::Ready => instance
                .Ready_filter()
                .topic1(swap_id)
                .from_block(from_block)
                .query()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?
                .into_iter()
                .map(|(_, log)| (None, log))
                .collect::<Vec<_>>(),
            LogKind::Claimed => instance
                .Claimed_filter()
                .topic1(swap_id)
                .from_block(from_block)
                .query()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?
                .into_iter()
                .map(|(event, log)| (Some(event.s.0), log))
                .collect(),
            LogKind::Refunded => instance
                .Refunded_filter()
                .topic1(swap_id)
                .from_block(from_block)
                .query()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?
                .into_iter()
                .map(|(event, log)| (Some(event.s.0), log))
                .collect(),
        };
        Ok(logs
            .into_iter()
            .map(|(secret, log)| SwapLog {
                kind,
                swap_id,
                secret,
                tx_hash: log.transaction_hash.unwrap_or_default(),
                block_number: log.block_number.unwrap_or(from_block),
            })
            .collect())
    }
}

fn to_abi(swap: &ContractSwap) -> SwapCreator::Swap {
    SwapCreator::Swap {
        owner: swap.owner,
        claimer: swap.claimer,
        claimCommitment: swap.claim_commitment,
        refundCommitment: swap.refund_commitment,
        timeout1: U256::from(swap.timeout_0),
        timeout2: U256::from(swap.timeout_1),
        asset: swap.asset,
        value: swap.value,
        nonce: swap.nonce,
    }
}

fn to_seconds(value: U256) -> Result<u64, ChainError> {
    u64::try_from(value).map_err(|_| ChainError::Log(format!("timeout {value} overflows u64")))
}

/// Sorts send failures into reverts (including the completed-swap error)
/// and transport failures.
fn classify(err: impl std::fmt::Display) -> ChainError {
    let text = err.to_string();
    let completed = hex::encode(SwapCreator::SwapCompleted::SELECTOR);
    if text.contains(&completed) || text.contains("SwapCompleted") {
        ChainError::Reverted(ALREADY_COMPLETED.into())
    } else if text.contains("revert") {
        ChainError::Reverted(text)
    } else {
        ChainError::TransactionFailed(text)
    }
}

#[async_trait]
impl ContractClient for EthereumContract {
    fn address(&self) -> EthAddress {
        self.sender
    }

    async fn new_swap(&self, request: &LockRequest) -> Result<LockReceipt, ChainError> {
        let instance = self.instance();
        let call = instance.newSwap(
            request.claim_commitment,
            request.refund_commitment,
            request.claimer,
            U256::from(request.timeout_duration_0),
            U256::from(request.timeout_duration_1),
            request.asset,
            request.value,
            request.nonce,
        );
        // tokens are pulled by allowance; only ether rides on the call
        let call = if request.asset == EthAddress::ZERO {
            call.value(request.value)
        } else {
            call
        };
        let receipt = call
            .send()
            .await
            .map_err(classify)?
            .get_receipt()
            .await
            .map_err(|e| ChainError::TransactionFailed(e.to_string()))?;
        if !receipt.status() {
            return Err(ChainError::Reverted("newSwap reverted".into()));
        }

        let event = receipt
            .inner
            .logs()
            .iter()
            .find_map(|log| log.log_decode::<SwapCreator::New>().ok())
            .ok_or_else(|| ChainError::Log("New event not found in receipt".into()))?
            .inner;
        let swap = ContractSwap {
            owner: self.sender,
            claimer: request.claimer,
            claim_commitment: event.claimKey,
            refund_commitment: event.refundKey,
            timeout_0: to_seconds(event.timeout1)?,
            timeout_1: to_seconds(event.timeout2)?,
            asset: event.asset,
            value: event.value,
            nonce: request.nonce,
        };
        if swap.swap_id() != event.swapID {
            return Err(ChainError::Log(format!(
                "New event id {} does not match the swap record",
                event.swapID
            )));
        }
        let block_number = receipt
            .block_number
            .ok_or_else(|| ChainError::Log("newSwap receipt has no block number".into()))?;
        debug!(swap_id = %event.swapID, tx_hash = %receipt.transaction_hash, block_number, "newSwap mined");
        Ok(LockReceipt {
            swap_id: event.swapID,
            swap,
            tx_hash: receipt.transaction_hash,
            block_number,
        })
    }

    async fn set_ready(&self, swap: &ContractSwap) -> Result<B256, ChainError> {
        let receipt = self
            .instance()
            .setReady(to_abi(swap))
            .send()
            .await
            .map_err(classify)?
            .get_receipt()
            .await
            .map_err(|e| ChainError::TransactionFailed(e.to_string()))?;
        if !receipt.status() {
            return Err(ChainError::Reverted("setReady reverted".into()));
        }
        Ok(receipt.transaction_hash)
    }

    async fn claim(&self, swap: &ContractSwap, secret: [u8; 32]) -> Result<B256, ChainError> {
        let receipt = self
            .instance()
            .claim(to_abi(swap), B256::from(secret))
            .send()
            .await
            .map_err(classify)?
            .get_receipt()
            .await
            .map_err(|e| ChainError::TransactionFailed(e.to_string()))?;
        if !receipt.status() {
            return Err(ChainError::Reverted("claim reverted".into()));
        }
        Ok(receipt.transaction_hash)
    }

    async fn refund(&self, swap: &ContractSwap, secret: [u8; 32]) -> Result<B256, ChainError> {
        let receipt = self
            .instance()
            .refund(to_abi(swap), B256::from(secret))
            .send()
            .await
            .map_err(classify)?
            .get_receipt()
            .await
            .map_err(|e| ChainError::TransactionFailed(e.to_string()))?;
        if !receipt.status() {
            return Err(ChainError::Reverted("refund reverted".into()));
        }
        Ok(receipt.transaction_hash)
    }

    async fn stage(&self, swap_id: SwapId) -> Result<ContractStage, ChainError> {
        let stage = retry_with_timeout("swaps", &self.retry, || async move {
            self.instance()
                .swaps(swap_id)
                .call()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await?;
        Ok(ContractStage::from_u8(stage))
    }

    async fn block_timestamp(&self) -> Result<u64, ChainError> {
        retry_with_timeout("latest block", &self.retry, || async move {
            let block = self
                .provider
                .get_block_by_number(BlockNumberOrTag::Latest)
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?
                .ok_or_else(|| ChainError::Rpc("latest block not found".into()))?;
            Ok(block.header.timestamp)
        })
        .await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        retry_with_timeout("block number", &self.retry, || async move {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
    }

    async fn filter_logs(
        &self,
        kind: LogKind,
        swap_id: SwapId,
        from_block: u64,
    ) -> Result<Vec<SwapLog>, ChainError> {
        retry_with_timeout("logs", &self.retry, || {
            self.query_logs(kind, swap_id, from_block)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolValue;

    fn sample() -> ContractSwap {
        ContractSwap {
            owner: EthAddress::repeat_byte(1),
            claimer: EthAddress::repeat_byte(2),
            claim_commitment: B256::repeat_byte(3),
            refund_commitment: B256::repeat_byte(4),
            timeout_0: 1_000,
            timeout_1: 2_000,
            asset: EthAddress::ZERO,
            value: U256::from(5u64),
            nonce: U256::from(6u64),
        }
    }

    #[test]
    fn abi_struct_hashes_to_the_same_id() {
        let swap = sample();
        let id = alloy::primitives::keccak256(to_abi(&swap).abi_encode());
        assert_eq!(id, swap.swap_id());
    }

    #[test]
    fn completed_selector_maps_to_benign_revert() {
        let selector = hex::encode(SwapCreator::SwapCompleted::SELECTOR);
        let err = classify(format!("server returned an error response: execution reverted, data: \"0x{selector}\""));
        assert!(err.is_already_completed());

        let other = classify("execution reverted: too early to claim!");
        assert_eq!(
            other,
            ChainError::Reverted("execution reverted: too early to claim!".into())
        );
        assert!(matches!(classify("connection refused"), ChainError::TransactionFailed(_)));
    }

    #[test]
    fn rpc_failures_after_retries_stay_rpc_errors() {
        let err = ChainError::from(anyhow::anyhow!("RPC timeout for logs"));
        assert_eq!(err, ChainError::Rpc("RPC timeout for logs".into()));
    }

    #[test]
    fn rejects_non_http_urls() {
        let key = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
        assert!(EthereumContract::new("ws://localhost:8545", key, EthAddress::ZERO).is_err());
        assert!(EthereumContract::new("http://localhost:8545", "nope", EthAddress::ZERO).is_err());
    }
}
