use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use xmr_wallet::{Address, Network, RetryConfig};

/// Two 12s slots: the least lead a pre-t0 refund needs to land before t0.
pub const MIN_REFUND_MARGIN: Duration = Duration::from_secs(24);

/// How long before t0 the initiator gives up on the counterparty's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundMargin {
    /// Share of the t0..t1 window, in basis points.
    pub fraction_bps: u32,
    pub minimum: Duration,
}

impl Default for RefundMargin {
    fn default() -> Self {
        Self {
            fraction_bps: 1_500,
            minimum: Duration::from_secs(30),
        }
    }
}

impl RefundMargin {
    /// `t0 - max(minimum, (t1 - t0) * fraction)`, in chain seconds.
    pub fn refund_deadline(&self, timeout_0: u64, timeout_1: u64) -> u64 {
        let window = timeout_1.saturating_sub(timeout_0);
        let fractional = window.saturating_mul(u64::from(self.fraction_bps)) / 10_000;
        timeout_0.saturating_sub(fractional.max(self.minimum.as_secs()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapConfig {
    pub network: Network,
    pub refund_margin: RefundMargin,
    /// Blocks the joint account's funds must sit under before ready is signalled.
    pub confirmations: u64,
    pub poll_interval: Duration,
    /// Requested for both the t0 and the t1 leg of a new swap.
    pub lock_timeout: Duration,
    /// Name of the wallet to reopen after working in a swap wallet.
    pub primary_wallet: String,
    pub deposit_address: Option<Address>,
    /// Sweep claimed funds out of the swap wallet.
    pub transfer_back: bool,
    pub rpc_retry: RetryConfig,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            refund_margin: RefundMargin::default(),
            confirmations: 10,
            poll_interval: Duration::from_secs(12),
            lock_timeout: Duration::from_secs(60 * 60),
            primary_wallet: "swap-wallet".to_string(),
            deposit_address: None,
            transfer_back: true,
            rpc_retry: RetryConfig::default(),
        }
    }
}

impl SwapConfig {
    /// Defaults overridden by `SWAP_*` variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let network = match env::var("SWAP_NETWORK") {
            Ok(value) => Network::from_str(&value).map_err(|err| anyhow!(err))?,
            Err(_) => defaults.network,
        };
        let deposit_address = env::var("SWAP_DEPOSIT_ADDRESS")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| Address::from_str(value.trim()))
            .transpose()
            .context("SWAP_DEPOSIT_ADDRESS is not a valid monero address")?;

        Ok(Self {
            network,
            refund_margin: RefundMargin {
                fraction_bps: read_env("SWAP_REFUND_MARGIN_BPS")?
                    .unwrap_or(defaults.refund_margin.fraction_bps),
                minimum: read_env("SWAP_REFUND_MARGIN_MIN_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.refund_margin.minimum),
            },
            confirmations: read_env("SWAP_CONFIRMATIONS")?.unwrap_or(defaults.confirmations),
            poll_interval: read_env("SWAP_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            lock_timeout: read_env("SWAP_LOCK_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_timeout),
            primary_wallet: env::var("SWAP_PRIMARY_WALLET").unwrap_or(defaults.primary_wallet),
            deposit_address,
            transfer_back: read_env("SWAP_TRANSFER_BACK")?.unwrap_or(defaults.transfer_back),
            rpc_retry: RetryConfig::from_env_prefixed("SWAP_RPC"),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout.is_zero() {
            return Err(anyhow!("lock timeout must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if self.refund_margin.minimum < MIN_REFUND_MARGIN {
            return Err(anyhow!(
                "refund margin must be at least {}s",
                MIN_REFUND_MARGIN.as_secs()
            ));
        }
        if self.refund_margin.fraction_bps > 10_000 {
            return Err(anyhow!("refund margin fraction cannot exceed 10000 bps"));
        }
        if self.refund_margin.minimum >= self.lock_timeout {
            return Err(anyhow!("refund margin must be shorter than the lock timeout"));
        }
        if self.primary_wallet.trim().is_empty() {
            return Err(anyhow!("primary wallet name must not be empty"));
        }
        if let Some(address) = &self.deposit_address {
            address
                .validate_network(self.network)
                .context("deposit address")?;
        }
        Ok(())
    }

    /// Timeouts of a contract swap this config will take part in: t0 before
    /// t1, with a claim window of at least [`MIN_REFUND_MARGIN`] between them.
    pub fn check_timeouts(&self, timeout_0: u64, timeout_1: u64) -> Result<()> {
        if timeout_0 >= timeout_1 {
            return Err(anyhow!("t0 ({timeout_0}) is not before t1 ({timeout_1})"));
        }
        let window = timeout_1 - timeout_0;
        if window < MIN_REFUND_MARGIN.as_secs() {
            return Err(anyhow!(
                "claim window of {window}s is shorter than {}s",
                MIN_REFUND_MARGIN.as_secs()
            ));
        }
        Ok(())
    }
}

fn read_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| anyhow!("{key}: {err}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_uses_the_larger_margin() {
        let margin = RefundMargin::default();
        // 15% of 3600s beats the 30s floor
        assert_eq!(margin.refund_deadline(10_000, 13_600), 10_000 - 540);
        // 15% of 100s falls under the floor
        assert_eq!(margin.refund_deadline(10_000, 10_100), 10_000 - 30);
    }

    #[test]
    fn deadline_saturates_near_zero() {
        assert_eq!(RefundMargin::default().refund_deadline(10, 20), 0);
    }

    #[test]
    fn default_config_is_valid() {
        SwapConfig::default().validate().unwrap();
    }

    #[test]
    fn timeouts_need_an_ordered_claim_window() {
        let config = SwapConfig::default();
        config.check_timeouts(1_000, 4_600).unwrap();
        assert!(config.check_timeouts(1_000, 1_000).is_err());
        assert!(config.check_timeouts(2_000, 1_000).is_err());
        assert!(config.check_timeouts(1_000, 1_010).is_err());
    }
}
