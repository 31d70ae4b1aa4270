use std::env;

use xmr_wallet::{Network, XmrWallet};

fn env_or_skip(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            eprintln!("Skipping test: set {} to run RPC tests.", key);
            None
        }
    }
}

#[tokio::test]
#[ignore = "requires monero-wallet-rpc running locally"]
async fn rpc_create_open_address_balance() {
    let url = match env_or_skip("MONERO_WALLET_RPC_URL") {
        Some(value) => value,
        None => return,
    };
    let wallet_name = env::var("MONERO_WALLET_NAME")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "swap_test_wallet".to_string());
    let wallet_password = env::var("MONERO_WALLET_PASSWORD")
        .ok()
        .filter(|value| !value.trim().is_empty());

    let wallet = XmrWallet::connect(&url).await.expect("connect wallet RPC");
    if wallet
        .create_wallet(&wallet_name, wallet_password.as_deref(), "English")
        .await
        .is_err()
    {
        wallet
            .open_wallet(&wallet_name, wallet_password.as_deref())
            .await
            .expect("open existing wallet");
    }

    let address = wallet.primary_address().await.expect("get primary address");
    assert_eq!(address.to_string().len(), 95);
    let balance = wallet.balance().await.expect("get balance");
    assert!(balance.unlocked <= balance.total);
    wallet.height().await.expect("get height");
}

#[tokio::test]
#[ignore = "requires monero-wallet-rpc running locally"]
async fn rpc_view_only_wallet_from_keys() {
    let url = match env_or_skip("MONERO_WALLET_RPC_URL") {
        Some(value) => value,
        None => return,
    };
    let network = env::var("MONERO_NETWORK")
        .ok()
        .and_then(|value| value.parse::<Network>().ok())
        .unwrap_or(Network::Stagenet);

    let keys = xmr_wallet::generate_key_pair();
    let address = keys.address(network);
    let filename = format!("view-only-{}", &address.to_string()[..12]);

    let wallet = XmrWallet::connect(&url).await.expect("connect wallet RPC");
    wallet
        .generate_from_keys(&filename, &address, None, keys.view_key(), 0, "")
        .await
        .expect("generate view-only wallet");
    assert_eq!(wallet.primary_address().await.expect("address"), address);
    assert_eq!(wallet.balance().await.expect("balance").total, 0);
    wallet.close_wallet().await.expect("close wallet");
}
