//! Finishing a swap from durable data alone.
//!
//! Recovery runs the same claim and refund decisions as a live session but
//! starts from the own secret, the contract swap and its id. The
//! counterparty's view key is re-derived from its revealed spend key.

use alloy_primitives::B256;
use swap_dleq::{secret_from_contract_bytes, secret_to_contract_bytes};
use tokio_util::sync::CancellationToken;
use tracing::info;
use xmr_wallet::{sum_private_key_pairs, Address, PrivateKey, PrivateKeyPair};

use crate::actions::{
    revealed_secret, sweep_destination, sweep_joint_account, try_claim, try_refund, ClaimOutcome,
    RefundOutcome,
};
use crate::config::SwapConfig;
use crate::error::{Result, SwapError};
use crate::machine::{wallet_name, SwapContext};
use crate::ports::{ContractSwap, LogKind, SwapId};
use crate::role::RoleKind;
use crate::state::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The contract asset was claimed.
    Claimed,
    /// The contract asset was refunded to its owner.
    Refunded,
    /// The joint monero account was rebuilt from both secrets and swept.
    WalletRestored { address: Address },
}

#[derive(Debug, Clone)]
pub struct RecoveryRequest {
    pub role: RoleKind,
    pub offer_id: B256,
    pub secret: PrivateKey,
    pub swap_id: SwapId,
    pub swap: ContractSwap,
    /// Block of the lock transaction; logs are searched from here.
    pub from_block: u64,
    /// Whether a monero transfer into the joint account was attempted.
    pub xmr_locked: bool,
    pub restore_height: u64,
}

pub async fn recover(
    ctx: &SwapContext,
    config: &SwapConfig,
    request: RecoveryRequest,
    cancel: &CancellationToken,
) -> Result<RecoveryOutcome> {
    info!(swap_id = %request.swap_id, role = ?request.role, "Recovering swap");
    match request.role {
        RoleKind::Initiator => recover_initiator(ctx, config, &request, cancel).await,
        RoleKind::Responder => recover_responder(ctx, config, &request, cancel).await,
    }
}

/// Loads the record for `offer_id`, recovers it and stores the outcome.
pub async fn recover_from_store(
    ctx: &SwapContext,
    config: &SwapConfig,
    offer_id: &B256,
    cancel: &CancellationToken,
) -> Result<RecoveryOutcome> {
    let mut record = ctx
        .store
        .load(offer_id)?
        .ok_or(SwapError::NothingToRecover("no record for this offer"))?;
    let (swap_id, swap) = record
        .contract()
        .map_err(|_| SwapError::NothingToRecover("swap never reached the contract"))?;
    let request = RecoveryRequest {
        role: record.role,
        offer_id: *offer_id,
        secret: record.secret()?,
        swap_id,
        swap,
        from_block: record.from_block,
        xmr_locked: record.xmr_lock.is_some(),
        restore_height: record.restore_height,
    };

    let outcome = recover(ctx, config, request, cancel).await?;
    record.stage = match (record.role, outcome) {
        (_, RecoveryOutcome::Claimed) => Stage::Claimed,
        (_, RecoveryOutcome::Refunded) => Stage::Refunded,
        (RoleKind::Initiator, RecoveryOutcome::WalletRestored { .. }) => Stage::Claimed,
        (RoleKind::Responder, RecoveryOutcome::WalletRestored { .. }) => Stage::Refunded,
    };
    ctx.store.save(&record)?;
    Ok(outcome)
}

async fn recover_initiator(
    ctx: &SwapContext,
    config: &SwapConfig,
    request: &RecoveryRequest,
    cancel: &CancellationToken,
) -> Result<RecoveryOutcome> {
    let claimed = revealed_secret(
        ctx.contract.as_ref(),
        LogKind::Claimed,
        request.swap_id,
        request.from_block,
    )
    .await?;
    if let Some(secret) = claimed {
        let address = restore_joint_wallet(ctx, config, request, secret, "claim", cancel).await?;
        return Ok(RecoveryOutcome::WalletRestored { address });
    }

    let secret = secret_to_contract_bytes(&request.secret);
    match try_refund(ctx, request.swap_id, &request.swap, secret).await? {
        // no claim log, so a completed swap is our earlier refund
        RefundOutcome::Refunded | RefundOutcome::AlreadyCompleted => Ok(RecoveryOutcome::Refunded),
        RefundOutcome::NotYet => Err(SwapError::NothingToRecover(
            "ready was signalled and t1 has not passed",
        )),
    }
}

async fn recover_responder(
    ctx: &SwapContext,
    config: &SwapConfig,
    request: &RecoveryRequest,
    cancel: &CancellationToken,
) -> Result<RecoveryOutcome> {
    let refunded = revealed_secret(
        ctx.contract.as_ref(),
        LogKind::Refunded,
        request.swap_id,
        request.from_block,
    )
    .await?;
    if let Some(secret) = refunded {
        if !request.xmr_locked {
            info!(swap_id = %request.swap_id, "Refunded before any monero was sent");
            return Ok(RecoveryOutcome::Refunded);
        }
        let address = restore_joint_wallet(ctx, config, request, secret, "reclaim", cancel).await?;
        return Ok(RecoveryOutcome::WalletRestored { address });
    }

    let secret = secret_to_contract_bytes(&request.secret);
    match try_claim(ctx, request.swap_id, &request.swap, secret).await? {
        // no refund log, so a completed swap is our earlier claim
        ClaimOutcome::Claimed | ClaimOutcome::AlreadyCompleted => Ok(RecoveryOutcome::Claimed),
        ClaimOutcome::NotYet => Err(SwapError::NothingToRecover(
            "before t0 and the contract is not ready",
        )),
        ClaimOutcome::Expired => Err(SwapError::NothingToRecover(
            "t1 passed; waiting for the initiator to refund",
        )),
    }
}

async fn restore_joint_wallet(
    ctx: &SwapContext,
    config: &SwapConfig,
    request: &RecoveryRequest,
    revealed: [u8; 32],
    purpose: &str,
    cancel: &CancellationToken,
) -> Result<Address> {
    let theirs = PrivateKeyPair::from_spend_key(secret_from_contract_bytes(&revealed)?);
    let ours = PrivateKeyPair::from_spend_key(request.secret.clone());
    let joint = sum_private_key_pairs(&ours, &theirs);

    let primary = ctx.wallet.primary_address().await?;
    sweep_joint_account(
        ctx,
        config,
        cancel,
        &wallet_name(&request.offer_id, purpose),
        &joint,
        request.restore_height,
        sweep_destination(config, primary),
    )
    .await
}
