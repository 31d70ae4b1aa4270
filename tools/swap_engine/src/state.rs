//! Session stages.
//!
//! Both roles walk the same stages. The initiator passes through
//! `AssetLocked` (ether locked) before `CounterKeyVerified` (joint account
//! funded and confirmed); the responder checks the contract first and locks
//! the privacy coin second.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingKeys,
    AssetLocked,
    CounterKeyVerified,
    Ready,
    Claimed,
    Refunded,
    Aborted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingKeys => "awaiting_keys",
            Self::AssetLocked => "asset_locked",
            Self::CounterKeyVerified => "counter_key_verified",
            Self::Ready => "ready",
            Self::Claimed => "claimed",
            Self::Refunded => "refunded",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Claimed | Self::Refunded | Self::Aborted)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
