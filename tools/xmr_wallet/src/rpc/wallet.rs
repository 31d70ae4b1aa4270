use std::collections::HashMap;
use std::str::FromStr;

use monero::Amount;
use monero_rpc::{
    GenerateFromKeysArgs, RpcClientBuilder, SweepAllArgs, TransferOptions, TransferPriority,
    WalletClient,
};
use tracing::debug;

use crate::address::Address;
use crate::crypto::PrivateKey;
use crate::rpc::retry::{retry_with_timeout, RetryConfig};
use crate::types::{Balance, Result, XmrWalletError};

/// Outputs need this many blocks before they are spendable.
pub const SPENDABLE_AGE: u64 = 10;

/// Thin wrapper over `monero-wallet-rpc`, plus an optional daemon endpoint used
/// to mine blocks on regtest networks.
pub struct XmrWallet {
    client: WalletClient,
    daemon_url: Option<String>,
    retry: RetryConfig,
}

impl XmrWallet {
    pub async fn connect(url: &str) -> Result<Self> {
        debug!(rpc_url = url, "Connecting to Monero wallet RPC");
        let rpc_client = RpcClientBuilder::new().build(url)?;
        Ok(Self {
            client: rpc_client.wallet(),
            daemon_url: None,
            retry: RetryConfig::from_env(),
        })
    }

    /// Enables `generate_blocks` against a regtest `monerod`.
    pub fn with_daemon(mut self, daemon_url: impl Into<String>) -> Self {
        self.daemon_url = Some(daemon_url.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn create_wallet(
        &self,
        filename: &str,
        password: Option<&str>,
        language: &str,
    ) -> Result<()> {
        debug!(wallet = filename, "Creating Monero wallet");
        self.client
            .create_wallet(
                filename.to_string(),
                password.map(str::to_string),
                language.to_string(),
            )
            .await?;
        Ok(())
    }

    /// Creates and opens a wallet for `address`. Without a spend key the wallet
    /// is view-only.
    pub async fn generate_from_keys(
        &self,
        filename: &str,
        address: &Address,
        spend_key: Option<&PrivateKey>,
        view_key: &PrivateKey,
        restore_height: u64,
        password: &str,
    ) -> Result<()> {
        debug!(
            wallet = filename,
            %address,
            view_only = spend_key.is_none(),
            restore_height,
            "Generating Monero wallet from keys"
        );
        let spendkey = spend_key.map(to_monero_key).transpose()?;
        self.client
            .generate_from_keys(GenerateFromKeysArgs {
                restore_height: Some(restore_height),
                filename: filename.to_string(),
                address: to_monero_address(address)?,
                spendkey,
                viewkey: to_monero_key(view_key)?,
                password: password.to_string(),
                autosave_current: Some(true),
            })
            .await?;
        Ok(())
    }

    pub async fn open_wallet(&self, filename: &str, password: Option<&str>) -> Result<()> {
        debug!(wallet = filename, "Opening Monero wallet");
        self.client
            .open_wallet(filename.to_string(), password.map(str::to_string))
            .await?;
        Ok(())
    }

    pub async fn close_wallet(&self) -> Result<()> {
        debug!("Closing Monero wallet");
        self.client.close_wallet().await?;
        Ok(())
    }

    pub async fn refresh(&self, start_height: Option<u64>) -> Result<()> {
        debug!(start_height, "Refreshing Monero wallet");
        let client = &self.client;
        retry_with_timeout("refresh", &self.retry, move || async move {
            client.refresh(start_height).await?;
            Ok::<_, XmrWalletError>(())
        })
        .await
    }

    pub async fn balance(&self) -> Result<Balance> {
        debug!("Fetching Monero wallet balance");
        let client = &self.client;
        let data = retry_with_timeout("get_balance", &self.retry, move || async move {
            Ok::<_, XmrWalletError>(client.get_balance(0, None).await?)
        })
        .await?;
        let total = data.balance.as_pico();
        let unlocked = data.unlocked_balance.as_pico();
        // wallet RPC does not report the unlock distance here; a partially
        // locked balance is assumed to need the full spendable age
        let blocks_to_unlock = if unlocked >= total { 0 } else { SPENDABLE_AGE };
        Ok(Balance {
            total,
            unlocked,
            blocks_to_unlock,
        })
    }

    pub async fn height(&self) -> Result<u64> {
        debug!("Fetching Monero wallet height");
        let client = &self.client;
        let height = retry_with_timeout("get_height", &self.retry, move || async move {
            Ok::<_, XmrWalletError>(client.get_height().await?)
        })
        .await?;
        Ok(height.get())
    }

    pub async fn primary_address(&self) -> Result<Address> {
        debug!("Fetching Monero primary address");
        let addresses = self.client.get_address(0, None).await?;
        Ok(Address::from_str(&addresses.address.to_string())?)
    }

    /// Sends `amount` piconero and returns the transaction hash.
    pub async fn transfer(&self, destination: &Address, amount: u64) -> Result<String> {
        debug!(%destination, amount, "Transferring XMR");
        let mut destinations = HashMap::new();
        destinations.insert(to_monero_address(destination)?, Amount::from_pico(amount));
        let data = self
            .client
            .transfer(destinations, TransferPriority::Default, TransferOptions::default())
            .await?;
        Ok(hex::encode(data.tx_hash.0.as_bytes()))
    }

    /// Sweeps every unlocked output of account 0 and returns the transaction hashes.
    pub async fn sweep_all(&self, destination: &Address) -> Result<Vec<String>> {
        debug!(%destination, "Sweeping Monero wallet");
        let data = self
            .client
            .sweep_all(SweepAllArgs {
                address: to_monero_address(destination)?,
                account_index: 0,
                subaddr_indices: None,
                priority: TransferPriority::Default,
                mixin: 15,
                ring_size: 16,
                unlock_time: 0,
                get_tx_keys: None,
                below_amount: None,
                do_not_relay: None,
                get_tx_hex: None,
                get_tx_metadata: None,
            })
            .await?;
        Ok(data
            .tx_hash_list
            .iter()
            .map(|hash| hex::encode(hash.0.as_bytes()))
            .collect())
    }

    /// Mines `count` blocks to `reward_address`. Regtest only.
    pub async fn generate_blocks(&self, count: u64, reward_address: &Address) -> Result<()> {
        let daemon_url = self
            .daemon_url
            .as_deref()
            .ok_or(XmrWalletError::Unsupported("generate_blocks without a daemon URL"))?;
        debug!(count, %reward_address, "Generating Monero blocks");
        let daemon = RpcClientBuilder::new().build(daemon_url)?.daemon().regtest();
        daemon
            .generate_blocks(count, to_monero_address(reward_address)?)
            .await?;
        Ok(())
    }
}

fn to_monero_key(key: &PrivateKey) -> Result<monero::PrivateKey> {
    monero::PrivateKey::from_slice(&key.to_bytes())
        .map_err(|err| anyhow::anyhow!("invalid monero private key: {err}").into())
}

fn to_monero_address(address: &Address) -> Result<monero::Address> {
    monero::Address::from_str(&address.to_string())
        .map_err(|err| anyhow::anyhow!("invalid monero address: {err}").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Network;
    use crate::crypto::generate_key_pair;

    #[test]
    fn addresses_agree_with_monero_crate() {
        let keys = generate_key_pair();
        for network in [Network::Mainnet, Network::Stagenet] {
            let ours = keys.address(network);
            let theirs = to_monero_address(&ours).unwrap();
            assert_eq!(theirs.network, network.to_monero());
            assert_eq!(theirs.public_spend.as_bytes(), &keys.public_key_pair().spend_key().to_compressed());
            assert_eq!(theirs.to_string(), ours.to_string());
        }
    }

    #[test]
    fn private_keys_convert_to_monero_keys() {
        let key = PrivateKey::random();
        let converted = to_monero_key(&key).unwrap();
        assert_eq!(converted.as_bytes(), &key.to_bytes());
    }
}
