use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use xmr_wallet::{Address, Balance, Network, PrivateKey, PrivateKeyPair, SPENDABLE_AGE};

use crate::ports::{WalletClient, WalletError, WalletGuard};

const GENESIS_HEIGHT: u64 = 100;

#[derive(Debug, Clone, Copy)]
struct Output {
    amount: u64,
    height: u64,
}

#[derive(Default)]
struct LedgerState {
    height: u64,
    tx_count: u64,
    outputs: HashMap<Address, Vec<Output>>,
}

impl LedgerState {
    fn balance_of(&self, address: &Address) -> Balance {
        let mut balance = Balance::default();
        for output in self.outputs.get(address).into_iter().flatten() {
            balance.total += output.amount;
            let unlock_height = output.height + SPENDABLE_AGE;
            if self.height >= unlock_height {
                balance.unlocked += output.amount;
            } else {
                balance.blocks_to_unlock = balance
                    .blocks_to_unlock
                    .max(unlock_height - self.height);
            }
        }
        balance
    }

    /// Removes every unlocked output of `address` and returns their sum.
    fn take_unlocked(&mut self, address: &Address) -> u64 {
        let height = self.height;
        let outputs = self.outputs.entry(*address).or_default();
        let (spent, kept): (Vec<Output>, Vec<Output>) = outputs
            .iter()
            .partition(|output| height >= output.height + SPENDABLE_AGE);
        *outputs = kept;
        spent.iter().map(|output| output.amount).sum()
    }

    fn credit(&mut self, address: &Address, amount: u64, height: u64) -> String {
        self.outputs
            .entry(*address)
            .or_default()
            .push(Output { amount, height });
        self.tx_count += 1;
        format!("{:064x}", self.tx_count)
    }
}

/// Shared in-process privacy-coin ledger keyed by address.
#[derive(Clone)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                height: GENESIS_HEIGHT,
                ..LedgerState::default()
            })),
        }
    }

    /// Credits `address` with already spendable funds.
    pub async fn fund(&self, address: &Address, amount: u64) {
        self.state.lock().await.credit(address, amount, 0);
    }

    pub async fn balance_of(&self, address: &Address) -> Balance {
        self.state.lock().await.balance_of(address)
    }

    pub async fn height(&self) -> u64 {
        self.state.lock().await.height
    }

    pub async fn mine(&self, blocks: u64) {
        self.state.lock().await.height += blocks;
    }

    async fn transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<String, WalletError> {
        let mut state = self.state.lock().await;
        let unlocked = state.balance_of(from).unlocked;
        if unlocked < amount {
            return Err(WalletError::Insufficient {
                unlocked,
                needed: amount,
            });
        }
        let taken = state.take_unlocked(from);
        if taken > amount {
            state.credit(from, taken - amount, 0);
        }
        let height = state.height;
        Ok(state.credit(to, amount, height))
    }

    async fn sweep(&self, from: &Address, to: &Address) -> Result<String, WalletError> {
        let mut state = self.state.lock().await;
        let taken = state.take_unlocked(from);
        if taken == 0 {
            return Err(WalletError::Insufficient {
                unlocked: 0,
                needed: 1,
            });
        }
        let height = state.height;
        Ok(state.credit(to, taken, height))
    }
}

struct WalletEntry {
    address: Address,
    spendable: bool,
}

#[derive(Default)]
struct WalletRegistry {
    wallets: HashMap<String, WalletEntry>,
    open: Option<String>,
}

impl WalletRegistry {
    fn open_entry(&self) -> Result<&WalletEntry, WalletError> {
        let name = self.open.as_ref().ok_or(WalletError::NotOpen)?;
        self.wallets
            .get(name)
            .ok_or_else(|| WalletError::UnknownWallet(name.clone()))
    }
}

/// One party's wallet service over a [`MockLedger`]. Like the real wallet
/// RPC it holds several wallet files with at most one open.
pub struct MockWallet {
    ledger: MockLedger,
    network: Network,
    primary: String,
    registry: Mutex<WalletRegistry>,
    slot: Arc<Mutex<()>>,
}

impl MockWallet {
    /// Registers and opens the primary wallet for `keys`.
    pub fn new(ledger: MockLedger, network: Network, primary: &str, keys: &PrivateKeyPair) -> Self {
        let mut registry = WalletRegistry::default();
        registry.wallets.insert(
            primary.to_string(),
            WalletEntry {
                address: keys.address(network),
                spendable: true,
            },
        );
        registry.open = Some(primary.to_string());
        Self {
            ledger,
            network,
            primary: primary.to_string(),
            registry: Mutex::new(registry),
            slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn ledger(&self) -> &MockLedger {
        &self.ledger
    }

    pub async fn open_wallet_name(&self) -> Option<String> {
        self.registry.lock().await.open.clone()
    }

    async fn open_address(&self, need_spend: bool) -> Result<Address, WalletError> {
        let registry = self.registry.lock().await;
        let entry = registry.open_entry()?;
        if need_spend && !entry.spendable {
            return Err(WalletError::ViewOnly(entry.address.to_string()));
        }
        Ok(entry.address)
    }
}

#[async_trait]
impl WalletClient for MockWallet {
    async fn exclusive(&self) -> WalletGuard {
        Arc::clone(&self.slot).lock_owned().await
    }

    async fn create_from_keys(
        &self,
        name: &str,
        keys: &PrivateKeyPair,
        _restore_height: u64,
    ) -> Result<Address, WalletError> {
        let address = keys.address(self.network);
        let mut registry = self.registry.lock().await;
        registry.wallets.insert(
            name.to_string(),
            WalletEntry {
                address,
                spendable: true,
            },
        );
        registry.open = Some(name.to_string());
        Ok(address)
    }

    async fn create_view_only(
        &self,
        name: &str,
        view_key: &PrivateKey,
        address: &Address,
        _restore_height: u64,
    ) -> Result<(), WalletError> {
        let view_public = address
            .public_view_key()
            .map_err(|_| WalletError::KeyMismatch)?;
        if view_key.public_key() != view_public {
            return Err(WalletError::KeyMismatch);
        }
        let mut registry = self.registry.lock().await;
        registry.wallets.insert(
            name.to_string(),
            WalletEntry {
                address: *address,
                spendable: false,
            },
        );
        registry.open = Some(name.to_string());
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<(), WalletError> {
        let mut registry = self.registry.lock().await;
        if !registry.wallets.contains_key(name) {
            return Err(WalletError::UnknownWallet(name.to_string()));
        }
        registry.open = Some(name.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), WalletError> {
        self.registry.lock().await.open = None;
        Ok(())
    }

    async fn refresh(&self) -> Result<(), WalletError> {
        self.open_address(false).await.map(|_| ())
    }

    async fn balance(&self) -> Result<Balance, WalletError> {
        let address = self.open_address(false).await?;
        Ok(self.ledger.balance_of(&address).await)
    }

    async fn primary_address(&self) -> Result<Address, WalletError> {
        let registry = self.registry.lock().await;
        registry
            .wallets
            .get(&self.primary)
            .map(|entry| entry.address)
            .ok_or_else(|| WalletError::UnknownWallet(self.primary.clone()))
    }

    async fn transfer(&self, destination: &Address, amount: u64) -> Result<String, WalletError> {
        let from = self.open_address(true).await?;
        self.ledger.transfer(&from, destination, amount).await
    }

    async fn sweep_all(&self, destination: &Address) -> Result<Vec<String>, WalletError> {
        let from = self.open_address(true).await?;
        Ok(vec![self.ledger.sweep(&from, destination).await?])
    }

    async fn generate_blocks(&self, count: u64) -> Result<(), WalletError> {
        if self.network != Network::Dev {
            return Err(WalletError::Unsupported("generate_blocks"));
        }
        self.ledger.mine(count).await;
        Ok(())
    }

    async fn height(&self) -> Result<u64, WalletError> {
        Ok(self.ledger.height().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use xmr_wallet::generate_key_pair;

    #[tokio::test]
    async fn transferred_funds_unlock_after_spendable_age() {
        let ledger = MockLedger::new();
        let alice = generate_key_pair();
        let bob = generate_key_pair().address(Network::Dev);
        let wallet = MockWallet::new(ledger.clone(), Network::Dev, "alice", &alice);
        ledger.fund(&alice.address(Network::Dev), 100).await;

        wallet.transfer(&bob, 60).await.unwrap();
        let received = ledger.balance_of(&bob).await;
        assert_eq!(received.total, 60);
        assert_eq!(received.unlocked, 0);
        assert_eq!(received.blocks_to_unlock, SPENDABLE_AGE);
        assert_eq!(wallet.balance().await.unwrap().unlocked, 40);

        wallet.generate_blocks(SPENDABLE_AGE).await.unwrap();
        assert_eq!(ledger.balance_of(&bob).await.unlocked, 60);
    }

    #[tokio::test]
    async fn view_only_wallet_cannot_spend() {
        let ledger = MockLedger::new();
        let primary = generate_key_pair();
        let watched = generate_key_pair();
        let address = watched.address(Network::Dev);
        let wallet = MockWallet::new(ledger.clone(), Network::Dev, "primary", &primary);
        ledger.fund(&address, 5).await;

        wallet
            .create_view_only("watch", watched.view_key(), &address, 0)
            .await
            .unwrap();
        assert_eq!(wallet.balance().await.unwrap().total, 5);
        assert!(matches!(
            wallet.sweep_all(&primary.address(Network::Dev)).await,
            Err(WalletError::ViewOnly(_))
        ));

        let err = wallet
            .create_view_only("wrong", primary.view_key(), &address, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::KeyMismatch));
    }

    #[tokio::test]
    async fn sweep_moves_everything_unlocked() {
        let ledger = MockLedger::new();
        let keys = generate_key_pair();
        let destination = generate_key_pair().address(Network::Dev);
        let wallet = MockWallet::new(ledger.clone(), Network::Dev, "primary", &keys);
        wallet.create_from_keys("joint", &keys, 0).await.unwrap();
        ledger.fund(&keys.address(Network::Dev), 7).await;

        wallet.sweep_all(&destination).await.unwrap();
        assert_eq!(ledger.balance_of(&destination).await.total, 7);
        assert!(wallet.sweep_all(&destination).await.is_err());
    }

    #[tokio::test]
    async fn open_wallet_slot_is_held_by_one_caller() {
        let keys = generate_key_pair();
        let wallet = MockWallet::new(MockLedger::new(), Network::Dev, "primary", &keys);

        let guard = wallet.exclusive().await;
        let waiting = tokio::time::timeout(Duration::from_millis(50), wallet.exclusive()).await;
        assert!(waiting.is_err());

        drop(guard);
        let again = tokio::time::timeout(Duration::from_millis(50), wallet.exclusive()).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn mining_is_dev_only() {
        let keys = generate_key_pair();
        let wallet = MockWallet::new(MockLedger::new(), Network::Stagenet, "primary", &keys);
        assert!(matches!(
            wallet.generate_blocks(1).await,
            Err(WalletError::Unsupported(_))
        ));
    }
}
