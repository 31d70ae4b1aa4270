use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use xmr_wallet::{Address, Balance, PrivateKey, PrivateKeyPair, XmrWalletError};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet rpc: {0}")]
    Rpc(String),
    #[error("no wallet is open")]
    NotOpen,
    #[error("unknown wallet {0}")]
    UnknownWallet(String),
    #[error("wallet cannot spend: {0}")]
    ViewOnly(String),
    #[error("insufficient unlocked balance: have {unlocked}, need {needed}")]
    Insufficient { unlocked: u64, needed: u64 },
    #[error("key material does not match the address")]
    KeyMismatch,
    #[error("{0} is not supported by this wallet")]
    Unsupported(&'static str),
}

impl From<XmrWalletError> for WalletError {
    fn from(err: XmrWalletError) -> Self {
        match err {
            XmrWalletError::Unsupported(what) => Self::Unsupported(what),
            other => Self::Rpc(format!("{other:#}")),
        }
    }
}

/// Held for one open, operate, reopen-primary sequence.
pub type WalletGuard = OwnedMutexGuard<()>;

/// Privacy-coin wallet service. One wallet is open at a time; every call
/// other than create/open acts on the open wallet.
#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Exclusive use of the open-wallet slot. Sessions sharing a wallet
    /// service take this around anything that opens a non-primary wallet.
    async fn exclusive(&self) -> WalletGuard;

    /// Creates and opens a spendable wallet for `keys`.
    async fn create_from_keys(
        &self,
        name: &str,
        keys: &PrivateKeyPair,
        restore_height: u64,
    ) -> Result<Address, WalletError>;

    /// Creates and opens a wallet that can only watch `address`.
    async fn create_view_only(
        &self,
        name: &str,
        view_key: &PrivateKey,
        address: &Address,
        restore_height: u64,
    ) -> Result<(), WalletError>;

    async fn open(&self, name: &str) -> Result<(), WalletError>;

    async fn close(&self) -> Result<(), WalletError>;

    async fn refresh(&self) -> Result<(), WalletError>;

    async fn balance(&self) -> Result<Balance, WalletError>;

    async fn primary_address(&self) -> Result<Address, WalletError>;

    /// Returns the transaction id.
    async fn transfer(&self, destination: &Address, amount: u64) -> Result<String, WalletError>;

    async fn sweep_all(&self, destination: &Address) -> Result<Vec<String>, WalletError>;

    /// Dev and test networks only.
    async fn generate_blocks(&self, count: u64) -> Result<(), WalletError>;

    async fn height(&self) -> Result<u64, WalletError>;
}
