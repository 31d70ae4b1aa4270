use std::env;
use std::time::Duration;

use swap_engine::{RefundMargin, SwapConfig};
use xmr_wallet::{generate_key_pair, Network};

#[test]
fn zero_durations_are_rejected() {
    let config = SwapConfig {
        lock_timeout: Duration::ZERO,
        ..SwapConfig::default()
    };
    assert!(config.validate().unwrap_err().to_string().contains("lock timeout"));

    let config = SwapConfig {
        poll_interval: Duration::ZERO,
        ..SwapConfig::default()
    };
    assert!(config.validate().unwrap_err().to_string().contains("poll interval"));
}

#[test]
fn contract_timeouts_must_leave_a_claim_window() {
    let config = SwapConfig::default();
    config.check_timeouts(10_000, 13_600).unwrap();
    let err = config.check_timeouts(10_000, 10_000).unwrap_err();
    assert!(err.to_string().contains("not before t1"));
    let err = config.check_timeouts(10_000, 10_012).unwrap_err();
    assert!(err.to_string().contains("claim window"));
}

#[test]
fn refund_margin_floor_is_enforced() {
    let config = SwapConfig {
        refund_margin: RefundMargin {
            minimum: Duration::from_secs(12),
            ..RefundMargin::default()
        },
        ..SwapConfig::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("at least 24s"));
}

#[test]
fn margin_must_fit_inside_the_lock() {
    let config = SwapConfig {
        lock_timeout: Duration::from_secs(30),
        ..SwapConfig::default()
    };
    assert!(config.validate().is_err());

    let config = SwapConfig {
        refund_margin: RefundMargin {
            fraction_bps: 10_001,
            ..RefundMargin::default()
        },
        ..SwapConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn deposit_address_must_match_network() {
    let mainnet = generate_key_pair().address(Network::Mainnet);
    let config = SwapConfig {
        network: Network::Stagenet,
        deposit_address: Some(mainnet),
        ..SwapConfig::default()
    };
    assert!(config.validate().is_err());

    let config = SwapConfig {
        network: Network::Dev,
        deposit_address: Some(mainnet),
        ..SwapConfig::default()
    };
    config.validate().unwrap();
}

// every SWAP_* variable is touched here only, so no other test races on them
#[test]
fn env_overrides_defaults() {
    let deposit = generate_key_pair().address(Network::Stagenet);
    env::set_var("SWAP_NETWORK", "stagenet");
    env::set_var("SWAP_DEPOSIT_ADDRESS", deposit.to_string());
    env::set_var("SWAP_REFUND_MARGIN_BPS", "2000");
    env::set_var("SWAP_REFUND_MARGIN_MIN_SECS", "60");
    env::set_var("SWAP_CONFIRMATIONS", "3");
    env::set_var("SWAP_POLL_INTERVAL_MS", "250");
    env::set_var("SWAP_LOCK_TIMEOUT_SECS", "7200");
    env::set_var("SWAP_PRIMARY_WALLET", "maker");
    env::set_var("SWAP_TRANSFER_BACK", "false");

    let config = SwapConfig::from_env().unwrap();
    assert_eq!(config.network, Network::Stagenet);
    assert_eq!(config.deposit_address, Some(deposit));
    assert_eq!(config.refund_margin.fraction_bps, 2000);
    assert_eq!(config.refund_margin.minimum, Duration::from_secs(60));
    assert_eq!(config.confirmations, 3);
    assert_eq!(config.poll_interval, Duration::from_millis(250));
    assert_eq!(config.lock_timeout, Duration::from_secs(7200));
    assert_eq!(config.primary_wallet, "maker");
    assert!(!config.transfer_back);
    config.validate().unwrap();

    env::set_var("SWAP_CONFIRMATIONS", "many");
    assert!(SwapConfig::from_env().is_err());
    env::set_var("SWAP_CONFIRMATIONS", "3");
    env::set_var("SWAP_NETWORK", "regtest");
    assert!(SwapConfig::from_env().is_err());

    for key in [
        "SWAP_NETWORK",
        "SWAP_DEPOSIT_ADDRESS",
        "SWAP_REFUND_MARGIN_BPS",
        "SWAP_REFUND_MARGIN_MIN_SECS",
        "SWAP_CONFIRMATIONS",
        "SWAP_POLL_INTERVAL_MS",
        "SWAP_LOCK_TIMEOUT_SECS",
        "SWAP_PRIMARY_WALLET",
        "SWAP_TRANSFER_BACK",
    ] {
        env::remove_var(key);
    }
    assert_eq!(SwapConfig::from_env().unwrap(), SwapConfig::default());
}
