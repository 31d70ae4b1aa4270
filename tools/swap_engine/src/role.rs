//! Role capabilities: which events each side expects in each stage and
//! which contract calls it may issue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SwapConfig;
use crate::error::Result;
use crate::event::{Event, EventKind};
use crate::machine::Swap;
use crate::ports::ContractSwap;
use crate::session::SwapSession;
use crate::state::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    /// Locks ether first and drives the contract to ready.
    Initiator,
    /// Locks the privacy coin and claims the ether.
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractCall {
    NewSwap,
    SetReady,
    Claim,
    Refund,
}

impl ContractCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewSwap => "new_swap",
            Self::SetReady => "set_ready",
            Self::Claim => "claim",
            Self::Refund => "refund",
        }
    }
}

#[async_trait]
pub trait Role: Sized + Send + Sync + 'static {
    const KIND: RoleKind;

    /// Transition table.
    fn expects(stage: Stage, event: EventKind) -> bool;

    fn permits(call: ContractCall) -> bool;

    /// Chain time after which transient failures stop being retried and
    /// the session exits instead.
    fn safety_deadline(config: &SwapConfig, swap: &ContractSwap) -> u64;

    /// Runs an expected event under the session lock.
    async fn handle(swap: &Swap<Self>, session: &mut SwapSession, event: Event) -> Result<()>;

    /// One attempt at driving the session to a terminal stage. Leaving the
    /// stage non-terminal means "try again later".
    async fn exit(swap: &Swap<Self>, session: &mut SwapSession) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Initiator;

#[derive(Debug, Clone, Copy, Default)]
pub struct Responder;

pub(crate) fn initiator_expects(stage: Stage, event: EventKind) -> bool {
    use EventKind::*;
    match stage {
        Stage::AwaitingKeys => matches!(event, KeysReceived),
        Stage::AssetLocked => matches!(
            event,
            XmrLocked | XmrLockConfirmed | Claimed | ShouldRefund | Swept
        ),
        // transient while ready is being signalled
        Stage::CounterKeyVerified => {
            matches!(event, XmrLockConfirmed | Claimed | ShouldRefund | Swept)
        }
        Stage::Ready => matches!(event, Claimed | ShouldRefund | Swept),
        Stage::Claimed | Stage::Refunded | Stage::Aborted => false,
    }
}

pub(crate) fn responder_expects(stage: Stage, event: EventKind) -> bool {
    use EventKind::*;
    match stage {
        Stage::AwaitingKeys => matches!(event, KeysReceived | ContractLocked),
        // monero may be on its way to the joint account
        Stage::CounterKeyVerified => matches!(event, Refunded | Swept),
        Stage::AssetLocked => matches!(event, ContractReady | ShouldClaim | Refunded | Swept),
        // a deferred claim re-runs after the stage already moved to ready
        Stage::Ready => matches!(event, ContractReady | ShouldClaim | Refunded | Swept),
        Stage::Claimed | Stage::Refunded | Stage::Aborted => false,
    }
}

/// Stages in which the session is still waiting on the peer; a disconnect
/// there leaves nothing else to wait for.
pub(crate) fn awaits_peer(kind: RoleKind, stage: Stage) -> bool {
    match kind {
        RoleKind::Initiator => matches!(stage, Stage::AwaitingKeys | Stage::AssetLocked),
        RoleKind::Responder => matches!(stage, Stage::AwaitingKeys),
    }
}
