//! Background tasks that turn chain time and chain logs into session events.
//!
//! Both kinds poll: the deadline timer re-reads the latest block timestamp on
//! every tick, the log watcher re-filters by swap id from the swap's first
//! block. Read failures back off and retry. The tasks end when they fire,
//! when the swap is cancelled, or, for log watchers, at their expiry.

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::event::Event;
use crate::machine::{backoff, pause_for, Swap};
use crate::ports::{LogKind, SwapId};
use crate::role::Role;

/// Dispatches `event` once the chain timestamp reaches `deadline`.
pub(crate) fn spawn_deadline<R: Role>(swap: Swap<R>, deadline: u64, event: Event) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cancel = swap.cancellation_token();
        let poll_interval = swap.config().poll_interval;
        let mut failures = 0;
        loop {
            match swap.ctx().contract.block_timestamp().await {
                Ok(now) if now >= deadline => break,
                Ok(_) => failures = 0,
                Err(err) => {
                    failures += 1;
                    warn!(offer_id = %swap.offer_id(), deadline, failures, error = %err, "Failed to read block timestamp");
                }
            }
            if pause_for(&cancel, backoff(poll_interval, failures)).await.is_err() {
                return;
            }
        }

        debug!(offer_id = %swap.offer_id(), deadline, event = ?event.kind(), "Deadline reached");
        if let Err(err) = swap.dispatch(event).await {
            error!(offer_id = %swap.offer_id(), error = %err, "Deadline handler failed");
        }
    })
}

/// Where a log watcher looks and for how long.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LogWatch {
    pub kind: LogKind,
    pub swap_id: SwapId,
    pub from_block: u64,
    /// Chain time at which the watcher gives up and exits the session.
    pub until: u64,
}

/// Dispatches the event for the first matching log. At `until` with no log
/// the session is handed to exit, which keeps settling on its own.
pub(crate) fn spawn_log_watcher<R: Role>(swap: Swap<R>, watch: LogWatch) -> JoinHandle<()> {
    tokio::spawn(async move {
        let LogWatch {
            kind,
            swap_id,
            from_block,
            until,
        } = watch;
        let contract = &swap.ctx().contract;
        let cancel = swap.cancellation_token();
        let poll_interval = swap.config().poll_interval;
        let mut failures = 0;
        let event = loop {
            match contract.filter_logs(kind, swap_id, from_block).await {
                Ok(logs) => {
                    failures = 0;
                    if let Some(event) = logs.into_iter().find_map(|log| match (kind, log.secret) {
                        (LogKind::Ready, _) => Some(Event::ContractReady),
                        (LogKind::Claimed, Some(secret)) => Some(Event::Claimed { secret }),
                        (LogKind::Refunded, Some(secret)) => Some(Event::Refunded { secret }),
                        (_, None) => {
                            warn!(%swap_id, ?kind, tx_hash = %log.tx_hash, "Log without a secret");
                            None
                        }
                    }) {
                        break event;
                    }
                }
                Err(err) => {
                    failures += 1;
                    warn!(%swap_id, ?kind, failures, error = %err, "Failed to filter logs");
                }
            }
            // expiry holds whether or not the log reads succeed
            if matches!(contract.block_timestamp().await, Ok(now) if now >= until) {
                info!(%swap_id, ?kind, until, failures, "No log before expiry; exiting");
                break Event::Exit;
            }
            if pause_for(&cancel, backoff(poll_interval, failures)).await.is_err() {
                return;
            }
        };

        debug!(%swap_id, ?kind, event = ?event.kind(), "Log watcher fired");
        if let Err(err) = swap.dispatch(event).await {
            error!(%swap_id, ?kind, error = %err, "Log handler failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use alloy_primitives::{Address as EthAddress, B256, U256};
    use async_trait::async_trait;
    use swap_dleq::{KeyProver, SigmaProver};
    use xmr_wallet::{generate_key_pair, Network};

    use super::*;
    use crate::adapters::{ChannelTransport, MockContract, MockLedger, MockWallet};
    use crate::config::SwapConfig;
    use crate::db::MemoryStore;
    use crate::machine::SwapContext;
    use crate::metrics::NoopMetrics;
    use crate::ports::{
        ChainError, ContractClient, ContractStage, ContractSwap, LockReceipt, LockRequest, SwapLog,
    };
    use crate::role::{Responder, RoleKind};
    use crate::session::{SwapSession, SwapTerms};
    use crate::state::Stage;

    /// Chain whose log queries always fail.
    struct LoglessChain(MockContract);

    #[async_trait]
    impl ContractClient for LoglessChain {
        fn address(&self) -> EthAddress {
            self.0.address()
        }

        async fn new_swap(&self, request: &LockRequest) -> Result<LockReceipt, ChainError> {
            self.0.new_swap(request).await
        }

        async fn set_ready(&self, swap: &ContractSwap) -> Result<B256, ChainError> {
            self.0.set_ready(swap).await
        }

        async fn claim(&self, swap: &ContractSwap, secret: [u8; 32]) -> Result<B256, ChainError> {
            self.0.claim(swap, secret).await
        }

        async fn refund(&self, swap: &ContractSwap, secret: [u8; 32]) -> Result<B256, ChainError> {
            self.0.refund(swap, secret).await
        }

        async fn stage(&self, swap_id: SwapId) -> Result<ContractStage, ChainError> {
            self.0.stage(swap_id).await
        }

        async fn block_timestamp(&self) -> Result<u64, ChainError> {
            self.0.block_timestamp().await
        }

        async fn block_number(&self) -> Result<u64, ChainError> {
            self.0.block_number().await
        }

        async fn filter_logs(
            &self,
            _kind: LogKind,
            _swap_id: SwapId,
            _from_block: u64,
        ) -> Result<Vec<SwapLog>, ChainError> {
            Err(ChainError::Rpc("query returned more than 10000 results".into()))
        }
    }

    #[tokio::test]
    async fn failing_log_reads_still_expire() {
        let chain = MockContract::new(EthAddress::repeat_byte(0xb0), 1_000);
        let keys = generate_key_pair();
        let primary = keys.address(Network::Dev);
        let (transport, _outbox) = ChannelTransport::new();
        let ctx = SwapContext {
            contract: Arc::new(LoglessChain(chain.clone())),
            wallet: Arc::new(MockWallet::new(MockLedger::new(), Network::Dev, "primary", &keys)),
            transport: Arc::new(transport),
            store: Arc::new(MemoryStore::new()),
            prover: Arc::new(SigmaProver),
            metrics: Arc::new(NoopMetrics),
        };
        let config = SwapConfig {
            network: Network::Dev,
            poll_interval: Duration::from_millis(5),
            ..SwapConfig::default()
        };
        let terms = SwapTerms {
            offer_id: B256::repeat_byte(3),
            eth_value: U256::from(1u64),
            xmr_amount: 1,
            asset: EthAddress::ZERO,
        };
        let session = SwapSession::new(
            RoleKind::Responder,
            terms,
            SigmaProver.generate().unwrap(),
            0,
            primary,
        );
        let swap = Swap::<Responder>::new(ctx, config, session);

        let watcher = spawn_log_watcher(
            swap.clone(),
            LogWatch {
                kind: LogKind::Ready,
                swap_id: B256::repeat_byte(9),
                from_block: 0,
                until: 2_000,
            },
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!watcher.is_finished());

        chain.set_time(2_000).await;
        tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .expect("watcher outlived its expiry")
            .unwrap();
        assert_eq!(swap.stage(), Stage::Aborted);
    }
}
