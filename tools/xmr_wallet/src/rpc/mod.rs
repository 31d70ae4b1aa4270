mod retry;
mod wallet;

pub use retry::{retry_with_timeout, RetryConfig};
pub use wallet::{XmrWallet, SPENDABLE_AGE};
