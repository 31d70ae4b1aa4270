use serde::{Deserialize, Serialize};
use xmr_wallet::Address;

use crate::message::{Message, SendKeys};
use crate::ports::{ContractSwap, SwapId};

/// Everything that can move a session: inbound messages, chain logs and timers.
#[derive(Debug, Clone)]
pub enum Event {
    KeysReceived(SendKeys),
    ContractLocked { swap_id: SwapId, swap: ContractSwap },
    XmrLocked { address: Address, tx_id: String },
    /// The joint account holds the agreed amount with enough confirmations.
    XmrLockConfirmed,
    ContractReady,
    /// Contract-format secret from a `Claimed` log.
    Claimed { secret: [u8; 32] },
    /// Contract-format secret from a `Refunded` log.
    Refunded { secret: [u8; 32] },
    ShouldRefund,
    ShouldClaim,
    /// The joint account was swept to `address`'s owner.
    Swept { address: Address },
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    KeysReceived,
    ContractLocked,
    XmrLocked,
    XmrLockConfirmed,
    ContractReady,
    Claimed,
    Refunded,
    ShouldRefund,
    ShouldClaim,
    Swept,
    Exit,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::KeysReceived(_) => EventKind::KeysReceived,
            Self::ContractLocked { .. } => EventKind::ContractLocked,
            Self::XmrLocked { .. } => EventKind::XmrLocked,
            Self::XmrLockConfirmed => EventKind::XmrLockConfirmed,
            Self::ContractReady => EventKind::ContractReady,
            Self::Claimed { .. } => EventKind::Claimed,
            Self::Refunded { .. } => EventKind::Refunded,
            Self::ShouldRefund => EventKind::ShouldRefund,
            Self::ShouldClaim => EventKind::ShouldClaim,
            Self::Swept { .. } => EventKind::Swept,
            Self::Exit => EventKind::Exit,
        }
    }
}

impl EventKind {
    /// Produced by the peer rather than by this process's watchers.
    pub fn is_message(&self) -> bool {
        matches!(
            self,
            Self::KeysReceived | Self::ContractLocked | Self::XmrLocked
        )
    }
}

impl From<Message> for Event {
    fn from(message: Message) -> Self {
        match message {
            Message::SendKeys(keys) => Self::KeysReceived(keys),
            Message::NotifyLocked { swap_id, swap, .. } => Self::ContractLocked { swap_id, swap },
            Message::NotifyXmrLock { address, tx_id } => Self::XmrLocked { address, tx_id },
        }
    }
}
