//! Decides whether a joint account holds the agreed lock.
//!
//! The watcher is fed heights and balances by its caller; it never talks to a
//! wallet itself, so the same policy runs against RPC wallets and test ledgers.

use tracing::{debug, warn};

use crate::types::Balance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Blocks a funded balance must sit under before it counts.
    pub confirmations_required: u64,
    /// Height regressions up to this many blocks are tolerated as noise.
    pub reorg_buffer: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            confirmations_required: 10,
            reorg_buffer: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherEvent {
    NoLockObserved,
    /// Funds arrived but are below the agreed amount.
    Insufficient { observed: u64, expected: u64 },
    AwaitingConfirmations {
        observed_height: u64,
        current_height: u64,
        remaining: u64,
    },
    Confirmed { unlocked: u64, confirmations: u64 },
    ReorgDetected {
        previous_height: u64,
        current_height: u64,
    },
}

#[derive(Debug)]
pub struct LockWatcher {
    config: WatcherConfig,
    expected_amount: u64,
    last_seen_height: Option<u64>,
    lock_height: Option<u64>,
}

impl LockWatcher {
    pub fn new(config: WatcherConfig, expected_amount: u64) -> Self {
        Self {
            config,
            expected_amount,
            last_seen_height: None,
            lock_height: None,
        }
    }

    pub fn expected_amount(&self) -> u64 {
        self.expected_amount
    }

    /// Records the chain height; a drop beyond the reorg buffer forgets the lock.
    pub fn update_height(&mut self, current_height: u64) -> Option<WatcherEvent> {
        let previous = self.last_seen_height.replace(current_height);
        match previous {
            Some(previous) if current_height + self.config.reorg_buffer < previous => {
                warn!(
                    previous_height = previous,
                    current_height, "Reorg detected; clearing observed lock height"
                );
                self.lock_height = None;
                Some(WatcherEvent::ReorgDetected {
                    previous_height: previous,
                    current_height,
                })
            }
            _ => None,
        }
    }

    /// Classifies `balance` at `current_height`. Only the unlocked balance can
    /// confirm a lock; a total below the agreed amount is reported as-is.
    pub fn evaluate(&mut self, balance: &Balance, current_height: u64) -> WatcherEvent {
        if balance.total == 0 {
            self.lock_height = None;
            return WatcherEvent::NoLockObserved;
        }
        if balance.total < self.expected_amount {
            return WatcherEvent::Insufficient {
                observed: balance.total,
                expected: self.expected_amount,
            };
        }

        // first height at which the full amount was seen
        let observed_height = *self.lock_height.get_or_insert_with(|| {
            debug!(lock_height = current_height, "Observed lock");
            current_height
        });
        let confirmations = current_height.saturating_sub(observed_height);
        let remaining = self
            .config
            .confirmations_required
            .saturating_sub(confirmations)
            .max(balance.blocks_to_unlock);

        if remaining == 0 && balance.unlocked >= self.expected_amount {
            WatcherEvent::Confirmed {
                unlocked: balance.unlocked,
                confirmations,
            }
        } else {
            WatcherEvent::AwaitingConfirmations {
                observed_height,
                current_height,
                remaining: remaining.max(1),
            }
        }
    }
}
