//! Port implementations: live chain and wallet clients, plus in-process
//! doubles that share one simulated ledger between both parties.

mod channel;
mod ethereum;
mod mock_contract;
mod mock_ledger;
mod xmr;

pub use channel::ChannelTransport;
pub use ethereum::EthereumContract;
pub use mock_contract::MockContract;
pub use mock_ledger::{MockLedger, MockWallet};
pub use xmr::XmrWalletClient;
