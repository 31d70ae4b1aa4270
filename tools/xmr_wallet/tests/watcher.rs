use xmr_wallet::{Balance, LockWatcher, WatcherConfig, WatcherEvent};

const EXPECTED: u64 = 1_000_000_000_000;

fn config() -> WatcherConfig {
    WatcherConfig {
        confirmations_required: 10,
        reorg_buffer: 5,
    }
}

fn balance(total: u64, unlocked: u64, blocks_to_unlock: u64) -> Balance {
    Balance {
        total,
        unlocked,
        blocks_to_unlock,
    }
}

#[test]
fn reports_no_lock_on_empty_account() {
    let mut watcher = LockWatcher::new(config(), EXPECTED);
    assert_eq!(
        watcher.evaluate(&Balance::default(), 100),
        WatcherEvent::NoLockObserved
    );
}

#[test]
fn short_lock_is_insufficient() {
    let mut watcher = LockWatcher::new(config(), EXPECTED);
    assert_eq!(
        watcher.evaluate(&balance(EXPECTED - 1, EXPECTED - 1, 0), 100),
        WatcherEvent::Insufficient {
            observed: EXPECTED - 1,
            expected: EXPECTED,
        }
    );
}

#[test]
fn waits_for_confirmations_then_confirms() {
    let mut watcher = LockWatcher::new(config(), EXPECTED);
    assert_eq!(
        watcher.evaluate(&balance(EXPECTED, 0, 10), 50),
        WatcherEvent::AwaitingConfirmations {
            observed_height: 50,
            current_height: 50,
            remaining: 10,
        }
    );
    assert_eq!(
        watcher.evaluate(&balance(EXPECTED, 0, 5), 55),
        WatcherEvent::AwaitingConfirmations {
            observed_height: 50,
            current_height: 55,
            remaining: 5,
        }
    );
    assert_eq!(
        watcher.evaluate(&balance(EXPECTED, EXPECTED, 0), 60),
        WatcherEvent::Confirmed {
            unlocked: EXPECTED,
            confirmations: 10,
        }
    );
}

#[test]
fn locked_balance_never_confirms() {
    let mut watcher = LockWatcher::new(config(), EXPECTED);
    watcher.evaluate(&balance(EXPECTED, 0, 0), 50);
    assert!(matches!(
        watcher.evaluate(&balance(EXPECTED, 0, 0), 80),
        WatcherEvent::AwaitingConfirmations { remaining: 1, .. }
    ));
}

#[test]
fn detects_reorg_and_clears_lock() {
    let mut watcher = LockWatcher::new(config(), EXPECTED);
    watcher.update_height(100);
    watcher.evaluate(&balance(EXPECTED, 0, 10), 100);

    assert_eq!(watcher.update_height(97), None);
    assert_eq!(
        watcher.update_height(90),
        Some(WatcherEvent::ReorgDetected {
            previous_height: 97,
            current_height: 90,
        })
    );
    // the lock is re-observed at the new height
    assert!(matches!(
        watcher.evaluate(&balance(EXPECTED, 0, 10), 90),
        WatcherEvent::AwaitingConfirmations {
            observed_height: 90,
            ..
        }
    ));
}
