//! Initiator: locks ether, verifies the counterparty's monero lock, signals
//! ready and sweeps the joint account once the claim reveals the secret.

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use swap_dleq::secret_from_contract_bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xmr_wallet::{Address, LockWatcher, Network, WatcherConfig, WatcherEvent, SPENDABLE_AGE};

use crate::actions::{
    read_joint_account, revealed_secret, sweep_destination, sweep_joint_account, try_refund,
    JointView, RefundOutcome,
};
use crate::config::SwapConfig;
use crate::error::{Result, SwapError};
use crate::event::{Event, EventKind};
use crate::machine::{backoff, pause_for, wallet_name, Swap, SwapContext};
use crate::message::{secp_commitment, Message, SendKeys};
use crate::ports::{ContractSwap, LockRequest, LogKind};
use crate::role::{initiator_expects, ContractCall, Initiator, Role, RoleKind};
use crate::session::{Job, SwapSession, SwapTerms, XmrLock};
use crate::state::Stage;
use crate::watcher::{spawn_deadline, spawn_log_watcher, LogWatch};

#[async_trait]
impl Role for Initiator {
    const KIND: RoleKind = RoleKind::Initiator;

    fn expects(stage: Stage, event: EventKind) -> bool {
        initiator_expects(stage, event)
    }

    fn permits(call: ContractCall) -> bool {
        matches!(
            call,
            ContractCall::NewSwap | ContractCall::SetReady | ContractCall::Refund
        )
    }

    /// Past the refund deadline the only safe move left is to settle.
    fn safety_deadline(config: &SwapConfig, swap: &ContractSwap) -> u64 {
        config
            .refund_margin
            .refund_deadline(swap.timeout_0, swap.timeout_1)
    }

    async fn handle(swap: &Swap<Self>, session: &mut SwapSession, event: Event) -> Result<()> {
        match event {
            Event::KeysReceived(keys) => lock_ether(swap, session, keys).await,
            Event::XmrLocked { address, tx_id } => {
                verify_xmr_lock(swap, session, address, tx_id).await
            }
            Event::XmrLockConfirmed => {
                if session.stage == Stage::AssetLocked {
                    swap.transition(session, Stage::CounterKeyVerified).await?;
                }
                signal_ready(swap, session).await
            }
            Event::Claimed { secret } => claim_xmr(swap, session, secret).await,
            Event::ShouldRefund => refund_if_due(swap, session).await,
            Event::Swept { address } => {
                info!(offer_id = %swap.offer_id(), %address, "Claimed monero from the joint account");
                swap.transition(session, Stage::Claimed).await
            }
            other => Err(SwapError::Sequence {
                stage: session.stage,
                event: other.kind(),
            }),
        }
    }

    async fn exit(swap: &Swap<Self>, session: &mut SwapSession) -> Result<()> {
        match session.stage {
            Stage::AwaitingKeys => swap.transition(session, Stage::Aborted).await,
            Stage::AssetLocked | Stage::CounterKeyVerified | Stage::Ready => {
                settle_once(swap, session).await
            }
            Stage::Claimed | Stage::Refunded | Stage::Aborted => Ok(()),
        }
    }
}

impl Swap<Initiator> {
    /// Generates this swap's keys, persists the secret and sends the keys
    /// to the counterparty.
    pub async fn start(ctx: SwapContext, config: SwapConfig, terms: SwapTerms) -> Result<Self> {
        config
            .validate()
            .map_err(|err| SwapError::Config(format!("{err:#}")))?;
        let keys = ctx.prover.generate()?;
        let restore_height = ctx.wallet.height().await?.saturating_sub(SPENDABLE_AGE);
        let primary_address = ctx.wallet.primary_address().await?;
        let eth_address = ctx.contract.address();

        let session = SwapSession::new(
            RoleKind::Initiator,
            terms,
            keys,
            restore_height,
            primary_address,
        );
        let swap = Swap::<Initiator>::new(ctx, config, session);

        let mut session = swap.lock().await;
        // the secret is on disk before any key leaves the process
        swap.persist(&session)?;
        let message = Message::SendKeys(SendKeys::from_key_proof(&session.keys, eth_address));
        if let Err(err) = swap.send(message).await {
            swap.fail(&mut session, err).await?;
        }
        info!(offer_id = %swap.offer_id(), "Swap started; keys sent");
        drop(session);
        Ok(swap)
    }
}

async fn lock_ether(swap: &Swap<Initiator>, session: &mut SwapSession, keys: SendKeys) -> Result<()> {
    let counterparty = keys.verify(swap.ctx().prover.as_ref())?;
    info!(offer_id = %swap.offer_id(), claimer = %counterparty.eth_address, "Counterparty keys verified");
    session.counterparty = Some(counterparty.clone());
    swap.persist(session)?;

    swap.ensure_permitted(ContractCall::NewSwap)?;
    let config = swap.config();
    let request = LockRequest {
        claim_commitment: secp_commitment(&counterparty.secp256k1),
        refund_commitment: B256::from(session.keys.commitment()),
        claimer: counterparty.eth_address,
        timeout_duration_0: config.lock_timeout.as_secs(),
        timeout_duration_1: config.lock_timeout.as_secs(),
        asset: session.terms.asset,
        value: session.terms.eth_value,
        nonce: U256::from_be_bytes(rand::random::<[u8; 32]>()),
    };
    let receipt = swap
        .timed("lock", swap.ctx().contract.new_swap(&request))
        .await?;
    let (swap_id, record) = (receipt.swap_id, receipt.swap);

    // t0 and t1 as the contract recorded them
    session.swap_id = Some(swap_id);
    session.contract = Some(record);
    session.from_block = receipt.block_number;
    swap.transition(session, Stage::AssetLocked).await?;
    info!(
        %swap_id,
        tx_hash = %receipt.tx_hash,
        block = receipt.block_number,
        t0 = record.timeout_0,
        t1 = record.timeout_1,
        "Locked ether"
    );

    swap.send(Message::NotifyLocked {
        swap_id,
        swap: record,
        tx_hash: receipt.tx_hash,
    })
    .await?;

    spawn_deadline(
        swap.clone(),
        Initiator::safety_deadline(config, &record),
        Event::ShouldRefund,
    );
    spawn_log_watcher(
        swap.clone(),
        LogWatch {
            kind: LogKind::Claimed,
            swap_id,
            from_block: receipt.block_number,
            until: record.timeout_1,
        },
    );
    Ok(())
}

/// Checks the reported address and starts watching the joint account. The
/// watch runs off the session lock and reports back with
/// [`Event::XmrLockConfirmed`].
async fn verify_xmr_lock(
    swap: &Swap<Initiator>,
    session: &mut SwapSession,
    address: Address,
    tx_id: String,
) -> Result<()> {
    if session.xmr_lock.is_some() {
        return Err(SwapError::Sequence {
            stage: session.stage,
            event: EventKind::XmrLocked,
        });
    }
    let config = swap.config();
    let expected = session.joint_address(config.network)?;
    if address != expected {
        return Err(SwapError::AddressMismatch {
            expected: expected.to_string(),
            got: address.to_string(),
        });
    }
    let (_, record) = session.contract()?;
    info!(offer_id = %swap.offer_id(), %address, %tx_id, "Counterparty reports monero lock");
    session.xmr_lock = Some(XmrLock {
        address,
        tx_id: Some(tx_id),
    });
    swap.persist(session)?;

    let view = JointView {
        name: wallet_name(&swap.offer_id(), "view"),
        view_key: session.joint_view_key()?,
        address: expected,
        restore_height: session.restore_height,
    };
    let ctx = swap.ctx().clone();
    let config = config.clone();
    let cancel = swap.cancellation_token();
    let expected_amount = session.terms.xmr_amount;
    let deadline = Initiator::safety_deadline(&config, &record);
    session.job = Some(Job::LockCheck);
    swap.spawn_job(Job::LockCheck, async move {
        wait_for_lock(&ctx, &config, &cancel, &view, expected_amount, deadline).await?;
        Ok(Event::XmrLockConfirmed)
    });
    Ok(())
}

/// Polls the joint account until the lock is confirmed or turns out short.
/// Read failures are retried; only the refund deadline ends the wait.
async fn wait_for_lock(
    ctx: &SwapContext,
    config: &SwapConfig,
    cancel: &CancellationToken,
    view: &JointView,
    expected_amount: u64,
    deadline: u64,
) -> Result<()> {
    let mut watcher = LockWatcher::new(
        WatcherConfig {
            confirmations_required: config.confirmations,
            ..WatcherConfig::default()
        },
        expected_amount,
    );
    let mut failures = 0;
    loop {
        let remaining = match read_joint_account(ctx, config, view).await {
            Ok((height, balance)) => {
                failures = 0;
                watcher.update_height(height);
                let remaining = match watcher.evaluate(&balance, height) {
                    WatcherEvent::Confirmed {
                        unlocked,
                        confirmations,
                    } => {
                        info!(unlocked, confirmations, "Monero lock confirmed");
                        return Ok(());
                    }
                    WatcherEvent::Insufficient { observed, expected } => {
                        return Err(SwapError::BalanceTooLow { observed, expected });
                    }
                    WatcherEvent::AwaitingConfirmations { remaining, .. } => Some(remaining),
                    WatcherEvent::NoLockObserved | WatcherEvent::ReorgDetected { .. } => None,
                };
                debug!(height, ?remaining, total = balance.total, "Waiting for monero lock");
                remaining
            }
            Err(err) if err.is_transient() => {
                failures += 1;
                warn!(address = %view.address, failures, error = %err, "Joint account read failed");
                None
            }
            Err(err) => return Err(err),
        };

        match ctx.contract.block_timestamp().await {
            Ok(now) if now >= deadline => {
                return Err(SwapError::Deadline("monero lock did not confirm before t0"));
            }
            Ok(_) => {}
            Err(err) => warn!(deadline, error = %err, "Failed to read block timestamp"),
        }
        match remaining {
            Some(remaining) if config.network == Network::Dev => {
                ctx.wallet.generate_blocks(remaining).await?;
            }
            _ => pause_for(cancel, backoff(config.poll_interval, failures)).await?,
        }
    }
}

async fn signal_ready(swap: &Swap<Initiator>, session: &mut SwapSession) -> Result<()> {
    swap.ensure_permitted(ContractCall::SetReady)?;
    let (swap_id, record) = session.contract()?;
    match swap
        .timed("set_ready", swap.ctx().contract.set_ready(&record))
        .await
    {
        Ok(tx_hash) => info!(%swap_id, %tx_hash, "Marked contract ready"),
        Err(err) if err.is_already_completed() => {
            info!(%swap_id, "Contract already completed; looking for a claim");
            let contract = swap.ctx().contract.as_ref();
            return match revealed_secret(contract, LogKind::Claimed, swap_id, session.from_block)
                .await?
            {
                Some(secret) => claim_xmr(swap, session, secret).await,
                None => Err(err.into()),
            };
        }
        Err(err) => return Err(err.into()),
    }

    swap.transition(session, Stage::Ready).await?;
    spawn_deadline(swap.clone(), record.timeout_1, Event::ShouldRefund);
    Ok(())
}

/// The responder claimed: its secret plus ours spends the joint account.
/// The sweep runs off the session lock and reports back with
/// [`Event::Swept`].
async fn claim_xmr(swap: &Swap<Initiator>, session: &mut SwapSession, secret: [u8; 32]) -> Result<()> {
    if session.job == Some(Job::Sweep) {
        debug!(offer_id = %swap.offer_id(), "Sweep already running");
        return Ok(());
    }
    let counterparty_spend = secret_from_contract_bytes(&secret)?;
    let joint = session.joint_private_keys(counterparty_spend)?;
    session.shared_spend_key = Some(joint.spend_key().clone());
    swap.persist(session)?;

    let ctx = swap.ctx().clone();
    let config = swap.config().clone();
    let cancel = swap.cancellation_token();
    let name = wallet_name(&swap.offer_id(), "claim");
    let restore_height = session.restore_height;
    let destination = sweep_destination(&config, session.primary_address);
    session.job = Some(Job::Sweep);
    swap.spawn_job(Job::Sweep, async move {
        let address = sweep_joint_account(
            &ctx,
            &config,
            &cancel,
            &name,
            &joint,
            restore_height,
            destination,
        )
        .await?;
        Ok(Event::Swept { address })
    });
    Ok(())
}

async fn refund_if_due(swap: &Swap<Initiator>, session: &mut SwapSession) -> Result<()> {
    swap.ensure_permitted(ContractCall::Refund)?;
    let (swap_id, record) = session.contract()?;
    match try_refund(swap.ctx(), swap_id, &record, session.keys.contract_secret()).await? {
        RefundOutcome::Refunded => swap.transition(session, Stage::Refunded).await,
        RefundOutcome::AlreadyCompleted => claim_or_assume_refunded(swap, session).await,
        RefundOutcome::NotYet => {
            if session.stage != Stage::Ready {
                warn!(%swap_id, "Refund deadline before t0 missed; waiting for t1");
                spawn_deadline(swap.clone(), record.timeout_1, Event::ShouldRefund);
            }
            Ok(())
        }
    }
}

/// The contract is completed: either the responder claimed, or an earlier
/// refund of ours landed.
async fn claim_or_assume_refunded(swap: &Swap<Initiator>, session: &mut SwapSession) -> Result<()> {
    let (swap_id, _) = session.contract()?;
    let contract = swap.ctx().contract.as_ref();
    match revealed_secret(contract, LogKind::Claimed, swap_id, session.from_block).await? {
        Some(secret) => claim_xmr(swap, session, secret).await,
        None => {
            info!(%swap_id, "No claim found; swap was refunded");
            swap.transition(session, Stage::Refunded).await
        }
    }
}

/// Exit with ether locked: claim if the secret is out, otherwise refund if
/// a refund window is open. Leaves the stage alone when neither applies yet.
async fn settle_once(swap: &Swap<Initiator>, session: &mut SwapSession) -> Result<()> {
    if session.job == Some(Job::Sweep) {
        return Ok(());
    }
    let (swap_id, record) = session.contract()?;
    let contract = swap.ctx().contract.as_ref();
    if let Some(secret) =
        revealed_secret(contract, LogKind::Claimed, swap_id, session.from_block).await?
    {
        return claim_xmr(swap, session, secret).await;
    }
    match try_refund(swap.ctx(), swap_id, &record, session.keys.contract_secret()).await? {
        RefundOutcome::Refunded => swap.transition(session, Stage::Refunded).await,
        RefundOutcome::AlreadyCompleted => claim_or_assume_refunded(swap, session).await,
        RefundOutcome::NotYet => {
            debug!(%swap_id, "No refund window open yet");
            Ok(())
        }
    }
}
