//! Contract and wallet actions shared by live sessions and recovery.
//!
//! Each action re-reads the contract stage and the chain clock right before
//! it decides, so a live session and a recovery run at the same moment reach
//! the same outcome.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xmr_wallet::{Address, Balance, Network, PrivateKey, PrivateKeyPair};

use crate::config::SwapConfig;
use crate::error::{Result, SwapError};
use crate::machine::{backoff, pause_for, SwapContext};
use crate::ports::{ContractClient, ContractStage, ContractSwap, LogKind, SwapId, WalletError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefundOutcome {
    Refunded,
    /// Someone completed the swap first.
    AlreadyCompleted,
    /// Between t0 and t1 with no refund window open.
    NotYet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClaimOutcome {
    Claimed,
    AlreadyCompleted,
    /// Before t0 and not ready.
    NotYet,
    /// t1 passed; only the owner can act now.
    Expired,
}

async fn live_stage(contract: &dyn ContractClient, swap_id: SwapId) -> Result<ContractStage> {
    match contract.stage(swap_id).await? {
        ContractStage::Invalid => Err(SwapError::ContractMismatch(format!(
            "swap {swap_id} does not exist on chain"
        ))),
        stage => Ok(stage),
    }
}

/// Refunds when `now >= t1`, or when `now < t0` and ready was never signalled.
pub(crate) async fn try_refund(
    ctx: &SwapContext,
    swap_id: SwapId,
    swap: &ContractSwap,
    secret: [u8; 32],
) -> Result<RefundOutcome> {
    let stage = live_stage(ctx.contract.as_ref(), swap_id).await?;
    if stage == ContractStage::Completed {
        return Ok(RefundOutcome::AlreadyCompleted);
    }
    let now = ctx.contract.block_timestamp().await?;
    let open = now >= swap.timeout_1 || (now < swap.timeout_0 && stage != ContractStage::Ready);
    if !open {
        debug!(%swap_id, now, t0 = swap.timeout_0, t1 = swap.timeout_1, "Refund window closed");
        return Ok(RefundOutcome::NotYet);
    }

    let started = std::time::Instant::now();
    let result = ctx.contract.refund(swap, secret).await;
    ctx.metrics.record_latency("refund", started.elapsed());
    match result {
        Ok(tx_hash) => {
            info!(%swap_id, %tx_hash, "Refunded contract swap");
            Ok(RefundOutcome::Refunded)
        }
        Err(err) if err.is_already_completed() => {
            info!(%swap_id, "Refund raced a completed swap");
            Ok(RefundOutcome::AlreadyCompleted)
        }
        Err(err) => Err(err.into()),
    }
}

/// Claims when `now < t1` and either `now >= t0` or the swap is ready.
pub(crate) async fn try_claim(
    ctx: &SwapContext,
    swap_id: SwapId,
    swap: &ContractSwap,
    secret: [u8; 32],
) -> Result<ClaimOutcome> {
    let stage = live_stage(ctx.contract.as_ref(), swap_id).await?;
    if stage == ContractStage::Completed {
        return Ok(ClaimOutcome::AlreadyCompleted);
    }
    let now = ctx.contract.block_timestamp().await?;
    if now >= swap.timeout_1 {
        return Ok(ClaimOutcome::Expired);
    }
    if now < swap.timeout_0 && stage != ContractStage::Ready {
        return Ok(ClaimOutcome::NotYet);
    }

    let started = std::time::Instant::now();
    let result = ctx.contract.claim(swap, secret).await;
    ctx.metrics.record_latency("claim", started.elapsed());
    match result {
        Ok(tx_hash) => {
            info!(%swap_id, %tx_hash, "Claimed contract swap");
            Ok(ClaimOutcome::Claimed)
        }
        Err(err) if err.is_already_completed() => {
            info!(%swap_id, "Claim raced a completed swap");
            Ok(ClaimOutcome::AlreadyCompleted)
        }
        Err(err) => Err(err.into()),
    }
}

/// Secret revealed by the first `kind` log of `swap_id`, if any.
pub(crate) async fn revealed_secret(
    contract: &dyn ContractClient,
    kind: LogKind,
    swap_id: SwapId,
    from_block: u64,
) -> Result<Option<[u8; 32]>> {
    Ok(contract
        .filter_logs(kind, swap_id, from_block)
        .await?
        .into_iter()
        .find_map(|log| log.secret))
}

/// Where swept funds go: nowhere when transfer-back is off.
pub(crate) fn sweep_destination(config: &SwapConfig, primary: Address) -> Option<Address> {
    config
        .transfer_back
        .then(|| config.deposit_address.unwrap_or(primary))
}

/// View-only access to the joint account.
#[derive(Debug, Clone)]
pub(crate) struct JointView {
    pub name: String,
    pub view_key: PrivateKey,
    pub address: Address,
    pub restore_height: u64,
}

/// Reopens the primary wallet after `result`. The first error wins.
async fn back_to_primary<T>(
    ctx: &SwapContext,
    config: &SwapConfig,
    result: std::result::Result<T, WalletError>,
) -> Result<T> {
    let reopened = ctx.wallet.open(&config.primary_wallet).await;
    let value = result?;
    reopened?;
    Ok(value)
}

/// Height and balance of the joint account, read through its view-only
/// wallet. The wallet is created on first use.
pub(crate) async fn read_joint_account(
    ctx: &SwapContext,
    config: &SwapConfig,
    view: &JointView,
) -> Result<(u64, Balance)> {
    let _guard = ctx.wallet.exclusive().await;
    let read = async {
        if ctx.wallet.open(&view.name).await.is_err() {
            ctx.wallet
                .create_view_only(&view.name, &view.view_key, &view.address, view.restore_height)
                .await?;
        }
        ctx.wallet.refresh().await?;
        let height = ctx.wallet.height().await?;
        let balance = ctx.wallet.balance().await?;
        Ok::<_, WalletError>((height, balance))
    }
    .await;
    back_to_primary(ctx, config, read).await
}

/// Sends `amount` out of the primary wallet.
pub(crate) async fn transfer_from_primary(
    ctx: &SwapContext,
    config: &SwapConfig,
    destination: &Address,
    amount: u64,
) -> Result<String> {
    let _guard = ctx.wallet.exclusive().await;
    ctx.wallet.open(&config.primary_wallet).await?;
    Ok(ctx.wallet.transfer(destination, amount).await?)
}

/// One look at the joint wallet: sweeps it if every output is spendable,
/// otherwise reports how far the funds are from unlocking.
async fn sweep_step(
    ctx: &SwapContext,
    config: &SwapConfig,
    wallet_name: &str,
    keys: &PrivateKeyPair,
    restore_height: u64,
    destination: Option<&Address>,
) -> Result<Option<Balance>> {
    let _guard = ctx.wallet.exclusive().await;
    let step = async {
        if ctx.wallet.open(wallet_name).await.is_err() {
            let address = ctx
                .wallet
                .create_from_keys(wallet_name, keys, restore_height)
                .await?;
            info!(%address, wallet = wallet_name, "Opened joint wallet");
        }
        ctx.wallet.refresh().await?;
        let balance = ctx.wallet.balance().await?;
        if balance.total == 0 || balance.unlocked < balance.total || balance.blocks_to_unlock > 0 {
            return Ok::<_, WalletError>(Some(balance));
        }
        if let Some(destination) = destination {
            let tx_ids = ctx.wallet.sweep_all(destination).await?;
            info!(%destination, ?tx_ids, "Swept joint wallet");
        }
        Ok::<_, WalletError>(None)
    }
    .await;
    back_to_primary(ctx, config, step).await
}

/// Opens the joint account from its full keys, waits until its funds are
/// spendable and sweeps them to `destination`. Read failures are retried
/// until `cancel` fires; the contract outcome is already settled.
pub(crate) async fn sweep_joint_account(
    ctx: &SwapContext,
    config: &SwapConfig,
    cancel: &CancellationToken,
    wallet_name: &str,
    keys: &PrivateKeyPair,
    restore_height: u64,
    destination: Option<Address>,
) -> Result<Address> {
    let started = std::time::Instant::now();
    let mut failures = 0;
    loop {
        match sweep_step(ctx, config, wallet_name, keys, restore_height, destination.as_ref()).await {
            Ok(None) => break,
            Ok(Some(balance)) => {
                failures = 0;
                debug!(
                    total = balance.total,
                    unlocked = balance.unlocked,
                    blocks_to_unlock = balance.blocks_to_unlock,
                    "Joint wallet funds not yet spendable"
                );
                if config.network == Network::Dev {
                    ctx.wallet
                        .generate_blocks(balance.blocks_to_unlock.max(1))
                        .await?;
                    continue;
                }
            }
            Err(err) if err.is_transient() => {
                failures += 1;
                warn!(wallet = wallet_name, failures, error = %err, "Joint wallet read failed");
            }
            Err(err) => return Err(err),
        }
        pause_for(cancel, backoff(config.poll_interval, failures)).await?;
    }
    ctx.metrics.record_latency("sweep", started.elapsed());
    Ok(keys.address(config.network))
}
