//! Responder: checks the initiator's contract, locks monero into the joint
//! account and claims the ether, or reclaims the monero after a refund.

use alloy_primitives::B256;
use async_trait::async_trait;
use swap_dleq::secret_from_contract_bytes;
use tracing::{debug, info, warn};
use xmr_wallet::SPENDABLE_AGE;

use crate::actions::{
    read_joint_account, revealed_secret, sweep_destination, sweep_joint_account,
    transfer_from_primary, try_claim, ClaimOutcome, JointView,
};
use crate::config::SwapConfig;
use crate::error::{Result, SwapError};
use crate::event::{Event, EventKind};
use crate::machine::{wallet_name, Swap, SwapContext};
use crate::message::{secp_commitment, Message, SendKeys};
use crate::ports::{ContractStage, ContractSwap, LogKind, SwapId};
use crate::role::{responder_expects, ContractCall, Responder, Role, RoleKind};
use crate::session::{Job, SwapSession, SwapTerms, XmrLock};
use crate::state::Stage;
use crate::watcher::{spawn_deadline, spawn_log_watcher, LogWatch};

#[async_trait]
impl Role for Responder {
    const KIND: RoleKind = RoleKind::Responder;

    fn expects(stage: Stage, event: EventKind) -> bool {
        responder_expects(stage, event)
    }

    fn permits(call: ContractCall) -> bool {
        matches!(call, ContractCall::Claim)
    }

    /// Claims stay possible until t1.
    fn safety_deadline(_config: &SwapConfig, swap: &ContractSwap) -> u64 {
        swap.timeout_1
    }

    async fn handle(swap: &Swap<Self>, session: &mut SwapSession, event: Event) -> Result<()> {
        match event {
            Event::KeysReceived(keys) => exchange_keys(swap, session, keys).await,
            Event::ContractLocked { swap_id, swap: record } => {
                let from_block = check_contract(swap, session, swap_id, &record).await?;
                lock_xmr(swap, session, swap_id, record, from_block).await
            }
            Event::ContractReady => {
                if session.stage == Stage::AssetLocked {
                    swap.transition(session, Stage::Ready).await?;
                }
                claim_if_due(swap, session).await
            }
            Event::ShouldClaim => claim_if_due(swap, session).await,
            Event::Refunded { secret } => reclaim_xmr(swap, session, secret).await,
            Event::Swept { address } => {
                info!(offer_id = %swap.offer_id(), %address, "Reclaimed monero after refund");
                swap.transition(session, Stage::Refunded).await
            }
            other => Err(SwapError::Sequence {
                stage: session.stage,
                event: other.kind(),
            }),
        }
    }

    async fn exit(swap: &Swap<Self>, session: &mut SwapSession) -> Result<()> {
        match session.stage {
            // nothing of ours is locked
            Stage::AwaitingKeys => swap.transition(session, Stage::Aborted).await,
            Stage::CounterKeyVerified => match session.xmr_lock.clone() {
                None => swap.transition(session, Stage::Aborted).await,
                Some(lock) => resolve_attempted_lock(swap, session, lock).await,
            },
            Stage::AssetLocked | Stage::Ready => settle_once(swap, session).await,
            Stage::Claimed | Stage::Refunded | Stage::Aborted => Ok(()),
        }
    }
}

impl Swap<Responder> {
    /// Takes the initiator's keys, verifies them and answers with ours.
    pub async fn accept(
        ctx: SwapContext,
        config: SwapConfig,
        terms: SwapTerms,
        keys: SendKeys,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|err| SwapError::Config(format!("{err:#}")))?;
        let own_keys = ctx.prover.generate()?;
        let restore_height = ctx.wallet.height().await?.saturating_sub(SPENDABLE_AGE);
        let primary_address = ctx.wallet.primary_address().await?;

        let session = SwapSession::new(
            RoleKind::Responder,
            terms,
            own_keys,
            restore_height,
            primary_address,
        );
        let swap = Swap::<Responder>::new(ctx, config, session);
        swap.dispatch(Event::KeysReceived(keys)).await?;
        Ok(swap)
    }
}

async fn exchange_keys(swap: &Swap<Responder>, session: &mut SwapSession, keys: SendKeys) -> Result<()> {
    if session.counterparty.is_some() {
        return Err(SwapError::Sequence {
            stage: session.stage,
            event: EventKind::KeysReceived,
        });
    }
    let counterparty = keys.verify(swap.ctx().prover.as_ref())?;
    info!(offer_id = %swap.offer_id(), owner = %counterparty.eth_address, "Initiator keys verified");
    session.counterparty = Some(counterparty);
    swap.persist(session)?;

    let reply = SendKeys::from_key_proof(&session.keys, swap.ctx().contract.address());
    swap.send(Message::SendKeys(reply)).await
}

/// Everything the contract swap must say before monero is put at risk.
/// Returns the chain head seen before the stage read: every later log of
/// this swap is at or above it.
async fn check_contract(
    swap: &Swap<Responder>,
    session: &mut SwapSession,
    swap_id: SwapId,
    record: &ContractSwap,
) -> Result<u64> {
    let counterparty = session.counterparty()?;
    let contract = &swap.ctx().contract;
    let mismatch = |what: &str| Err(SwapError::ContractMismatch(what.to_string()));

    if record.swap_id() != swap_id {
        return mismatch("swap id does not hash the swap record");
    }
    if record.claim_commitment != B256::from(session.keys.commitment()) {
        return mismatch("claim commitment is not ours");
    }
    if record.refund_commitment != secp_commitment(&counterparty.secp256k1) {
        return mismatch("refund commitment is not the initiator's");
    }
    if record.claimer != contract.address() {
        return mismatch("claimer is not our address");
    }
    if record.asset != session.terms.asset {
        return mismatch("asset differs from the agreed asset");
    }
    if record.value < session.terms.eth_value {
        return mismatch("locked value is below the agreed amount");
    }
    swap.config()
        .check_timeouts(record.timeout_0, record.timeout_1)
        .map_err(|err| SwapError::ContractMismatch(format!("{err:#}")))?;

    let from_block = contract.block_number().await?;
    let stage = contract.stage(swap_id).await?;
    if stage != ContractStage::Pending {
        return Err(SwapError::ContractMismatch(format!(
            "contract swap is {stage:?}, not pending"
        )));
    }

    let deadline = swap
        .config()
        .refund_margin
        .refund_deadline(record.timeout_0, record.timeout_1);
    if contract.block_timestamp().await? >= deadline {
        return Err(SwapError::Deadline("too close to t0 to lock monero"));
    }
    Ok(from_block)
}

async fn lock_xmr(
    swap: &Swap<Responder>,
    session: &mut SwapSession,
    swap_id: SwapId,
    record: ContractSwap,
    from_block: u64,
) -> Result<()> {
    let config = swap.config();
    let address = session.joint_address(config.network)?;
    let amount = session.terms.xmr_amount;
    session.swap_id = Some(swap_id);
    session.contract = Some(record);
    session.from_block = from_block;
    // on disk before any monero moves
    session.xmr_lock = Some(XmrLock {
        address,
        tx_id: None,
    });
    swap.transition(session, Stage::CounterKeyVerified).await?;

    let tx_id = swap
        .timed("lock_xmr", transfer_from_primary(swap.ctx(), config, &address, amount))
        .await?;
    info!(%swap_id, %address, amount, %tx_id, "Locked monero in the joint account");

    for kind in [LogKind::Ready, LogKind::Refunded] {
        spawn_log_watcher(
            swap.clone(),
            LogWatch {
                kind,
                swap_id,
                from_block,
                until: record.timeout_1,
            },
        );
    }
    spawn_deadline(swap.clone(), record.timeout_0, Event::ShouldClaim);

    session.xmr_lock = Some(XmrLock {
        address,
        tx_id: Some(tx_id.clone()),
    });
    swap.transition(session, Stage::AssetLocked).await?;
    swap.send(Message::NotifyXmrLock { address, tx_id }).await
}

/// Exit after a transfer to the joint account was attempted but never
/// confirmed by the wallet. The joint balance decides whether monero is at
/// stake.
async fn resolve_attempted_lock(
    swap: &Swap<Responder>,
    session: &mut SwapSession,
    lock: XmrLock,
) -> Result<()> {
    let view = JointView {
        name: wallet_name(&swap.offer_id(), "view"),
        view_key: session.joint_view_key()?,
        address: lock.address,
        restore_height: session.restore_height,
    };
    let (_, balance) = read_joint_account(swap.ctx(), swap.config(), &view).await?;
    if balance.total == 0 {
        warn!(offer_id = %swap.offer_id(), address = %lock.address, "Monero lock never reached the joint account");
        return swap.transition(session, Stage::Aborted).await;
    }
    info!(
        offer_id = %swap.offer_id(),
        address = %lock.address,
        total = balance.total,
        "Monero lock landed despite the wallet error"
    );
    swap.transition(session, Stage::AssetLocked).await?;
    settle_once(swap, session).await
}

async fn claim_if_due(swap: &Swap<Responder>, session: &mut SwapSession) -> Result<()> {
    swap.ensure_permitted(ContractCall::Claim)?;
    let (swap_id, record) = session.contract()?;
    match try_claim(swap.ctx(), swap_id, &record, session.keys.contract_secret()).await? {
        ClaimOutcome::Claimed => swap.transition(session, Stage::Claimed).await,
        ClaimOutcome::AlreadyCompleted => reclaim_or_assume_claimed(swap, session).await,
        ClaimOutcome::NotYet => Ok(()),
        ClaimOutcome::Expired => {
            warn!(%swap_id, "t1 passed before claiming; waiting for the refund");
            Ok(())
        }
    }
}

/// The contract is completed: either the initiator refunded, or an earlier
/// claim of ours landed.
async fn reclaim_or_assume_claimed(swap: &Swap<Responder>, session: &mut SwapSession) -> Result<()> {
    let (swap_id, _) = session.contract()?;
    let contract = swap.ctx().contract.as_ref();
    match revealed_secret(contract, LogKind::Refunded, swap_id, session.from_block).await? {
        Some(secret) => reclaim_xmr(swap, session, secret).await,
        None => {
            info!(%swap_id, "No refund found; swap was claimed");
            swap.transition(session, Stage::Claimed).await
        }
    }
}

/// The initiator refunded: its secret plus ours spends the joint account.
/// The sweep runs off the session lock and reports back with
/// [`Event::Swept`].
async fn reclaim_xmr(swap: &Swap<Responder>, session: &mut SwapSession, secret: [u8; 32]) -> Result<()> {
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
    let name = wallet_name(&swap.offer_id(), "reclaim");
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

/// Exit with monero locked: reclaim if the initiator refunded, otherwise
/// claim if the contract lets us. Leaves the stage alone when neither
/// applies yet.
async fn settle_once(swap: &Swap<Responder>, session: &mut SwapSession) -> Result<()> {
    if session.job == Some(Job::Sweep) {
        return Ok(());
    }
    let (swap_id, record) = session.contract()?;
    let contract = swap.ctx().contract.as_ref();
    if let Some(secret) =
        revealed_secret(contract, LogKind::Refunded, swap_id, session.from_block).await?
    {
        return reclaim_xmr(swap, session, secret).await;
    }
    match try_claim(swap.ctx(), swap_id, &record, session.keys.contract_secret()).await? {
        ClaimOutcome::Claimed => swap.transition(session, Stage::Claimed).await,
        ClaimOutcome::AlreadyCompleted => reclaim_or_assume_claimed(swap, session).await,
        ClaimOutcome::NotYet | ClaimOutcome::Expired => {
            debug!(%swap_id, "Nothing to claim yet");
            Ok(())
        }
    }
}
