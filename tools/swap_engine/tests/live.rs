use std::env;
use std::str::FromStr;

use alloy_primitives::Address as EthAddress;
use swap_engine::adapters::{EthereumContract, XmrWalletClient};
use swap_engine::ports::{ContractClient, ContractStage, WalletClient};
use xmr_wallet::{generate_key_pair, Network, RetryConfig};

fn env_or_skip(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            eprintln!("Skipping test: set {} to run live tests.", key);
            None
        }
    }
}

#[tokio::test]
#[ignore = "requires monero-wallet-rpc running locally"]
async fn wallet_client_switches_between_swap_and_primary_wallets() {
    let url = match env_or_skip("MONERO_WALLET_RPC_URL") {
        Some(value) => value,
        None => return,
    };
    let primary = env::var("MONERO_WALLET_NAME").unwrap_or_else(|_| "swap_test_wallet".to_string());
    let password = env::var("MONERO_WALLET_PASSWORD").unwrap_or_default();
    let network = env::var("MONERO_NETWORK")
        .ok()
        .and_then(|value| value.parse::<Network>().ok())
        .unwrap_or(Network::Stagenet);

    let client = XmrWalletClient::connect(&url, None, network, &primary, &password, RetryConfig::default())
        .await
        .expect("connect wallet RPC");
    let primary_address = client.primary_address().await.expect("primary address");

    let keys = generate_key_pair();
    let address = keys.address(network);
    let name = format!("swap-test-{}", &address.to_string()[..12]);
    client
        .create_view_only(&name, keys.view_key(), &address, 0)
        .await
        .expect("view-only wallet");
    assert_eq!(client.balance().await.expect("balance").total, 0);

    client.open(client.primary_wallet()).await.expect("reopen primary");
    assert_eq!(client.primary_address().await.expect("address"), primary_address);
}

#[tokio::test]
#[ignore = "requires an ethereum node with the swap creator deployed"]
async fn contract_client_reads_chain_state() {
    let (url, key, contract) = match (
        env_or_skip("ETH_RPC_URL"),
        env_or_skip("ETH_PRIVATE_KEY"),
        env_or_skip("SWAP_CREATOR_ADDRESS"),
    ) {
        (Some(url), Some(key), Some(contract)) => (url, key, contract),
        _ => return,
    };
    let contract = EthAddress::from_str(&contract).expect("contract address");
    let client = EthereumContract::new(&url, &key, contract).expect("connect");

    assert!(client.block_timestamp().await.expect("timestamp") > 0);
    let stage = client
        .stage(alloy_primitives::B256::repeat_byte(0xee))
        .await
        .expect("stage");
    assert_eq!(stage, ContractStage::Invalid);
}
