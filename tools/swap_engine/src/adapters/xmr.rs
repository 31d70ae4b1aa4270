use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;
use xmr_wallet::{Address, Balance, Network, PrivateKey, PrivateKeyPair, RetryConfig, XmrWallet};

use crate::ports::{WalletClient, WalletError, WalletGuard};

/// `monero-wallet-rpc` behind the [`WalletClient`] port.
///
/// Every wallet file created by the swap shares one password. The primary
/// address is read once at connect time since later calls may act on a
/// joint wallet. The rpc has one open-wallet slot, shared by every session
/// through [`WalletClient::exclusive`].
pub struct XmrWalletClient {
    wallet: XmrWallet,
    network: Network,
    primary: String,
    primary_address: Address,
    password: String,
    slot: Arc<Mutex<()>>,
}

impl XmrWalletClient {
    pub async fn connect(
        rpc_url: &str,
        daemon_url: Option<&str>,
        network: Network,
        primary: &str,
        password: &str,
        retry: RetryConfig,
    ) -> Result<Self, WalletError> {
        let mut wallet = XmrWallet::connect(rpc_url).await?.with_retry(retry);
        if let Some(daemon_url) = daemon_url {
            wallet = wallet.with_daemon(daemon_url);
        }
        wallet.open_wallet(primary, Some(password)).await?;
        let primary_address = wallet.primary_address().await?;
        primary_address
            .validate_network(network)
            .map_err(|err| WalletError::Rpc(format!("primary wallet {primary}: {err}")))?;
        info!(wallet = primary, %primary_address, "Connected to monero wallet rpc");
        Ok(Self {
            wallet,
            network,
            primary: primary.to_string(),
            primary_address,
            password: password.to_string(),
            slot: Arc::new(Mutex::new(())),
        })
    }

    pub fn primary_wallet(&self) -> &str {
        &self.primary
    }
}

#[async_trait]
impl WalletClient for XmrWalletClient {
    async fn exclusive(&self) -> WalletGuard {
        Arc::clone(&self.slot).lock_owned().await
    }

    async fn create_from_keys(
        &self,
        name: &str,
        keys: &PrivateKeyPair,
        restore_height: u64,
    ) -> Result<Address, WalletError> {
        let address = keys.address(self.network);
        self.wallet
            .generate_from_keys(
                name,
                &address,
                Some(keys.spend_key()),
                keys.view_key(),
                restore_height,
                &self.password,
            )
            .await?;
        Ok(address)
    }

    async fn create_view_only(
        &self,
        name: &str,
        view_key: &PrivateKey,
        address: &Address,
        restore_height: u64,
    ) -> Result<(), WalletError> {
        let view_public = address
            .public_view_key()
            .map_err(|_| WalletError::KeyMismatch)?;
        if view_key.public_key() != view_public {
            return Err(WalletError::KeyMismatch);
        }
        self.wallet
            .generate_from_keys(name, address, None, view_key, restore_height, &self.password)
            .await?;
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<(), WalletError> {
        Ok(self.wallet.open_wallet(name, Some(&self.password)).await?)
    }

    async fn close(&self) -> Result<(), WalletError> {
        Ok(self.wallet.close_wallet().await?)
    }

    async fn refresh(&self) -> Result<(), WalletError> {
        Ok(self.wallet.refresh(None).await?)
    }

    async fn balance(&self) -> Result<Balance, WalletError> {
        Ok(self.wallet.balance().await?)
    }

    async fn primary_address(&self) -> Result<Address, WalletError> {
        Ok(self.primary_address)
    }

    async fn transfer(&self, destination: &Address, amount: u64) -> Result<String, WalletError> {
        Ok(self.wallet.transfer(destination, amount).await?)
    }

    async fn sweep_all(&self, destination: &Address) -> Result<Vec<String>, WalletError> {
        Ok(self.wallet.sweep_all(destination).await?)
    }

    async fn generate_blocks(&self, count: u64) -> Result<(), WalletError> {
        Ok(self
            .wallet
            .generate_blocks(count, &self.primary_address)
            .await?)
    }

    async fn height(&self) -> Result<u64, WalletError> {
        Ok(self.wallet.height().await?)
    }
}
