use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::warn;

/// Backoff policy for idempotent RPC reads. Transactions are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(6_000),
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    /// Reads `XMR_WALLET_RPC_*`.
    pub fn from_env() -> Self {
        Self::from_env_prefixed("XMR_WALLET_RPC")
    }

    /// Reads `{prefix}_TIMEOUT_MS`, `{prefix}_MAX_RETRIES`, `{prefix}_BASE_DELAY_MS`,
    /// `{prefix}_MAX_DELAY_MS` and `{prefix}_JITTER_MS`, falling back to defaults.
    pub fn from_env_prefixed(prefix: &str) -> Self {
        let default = Self::default();
        let var = |name: &str, fallback: u64| read_env_u64(&format!("{prefix}_{name}"), fallback);
        Self {
            timeout: Duration::from_millis(var("TIMEOUT_MS", millis(default.timeout))),
            max_retries: var("MAX_RETRIES", default.max_retries as u64) as usize,
            base_delay: Duration::from_millis(var("BASE_DELAY_MS", millis(default.base_delay))),
            max_delay: Duration::from_millis(var("MAX_DELAY_MS", millis(default.max_delay))),
            jitter_ms: var("JITTER_MS", default.jitter_ms),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        let capped = std::cmp::min(backoff, self.max_delay);
        if self.jitter_ms == 0 {
            capped
        } else {
            capped + Duration::from_millis(rand::thread_rng().gen_range(0..=self.jitter_ms))
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn read_env_u64(key: &str, fallback: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(fallback)
}

/// Runs `action` until it succeeds, each attempt bounded by `config.timeout`.
/// The last error is returned once `max_retries` retries are spent.
pub async fn retry_with_timeout<T, E, F, Fut>(
    label: &'static str,
    config: &RetryConfig,
    mut action: F,
) -> Result<T, E>
where
    E: From<anyhow::Error> + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = config.max_retries.saturating_add(1);
    for attempt in 0..attempts {
        let last = attempt + 1 >= attempts;
        match timeout(config.timeout, action()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if last => return Err(err),
            Ok(Err(err)) => {
                warn!(attempt = attempt + 1, error = %err, "RPC error on {label}; retrying");
            }
            Err(_) if last => {
                return Err(anyhow::anyhow!("RPC timeout for {label}").into());
            }
            Err(_) => warn!(attempt = attempt + 1, "RPC timeout on {label}; retrying"),
        }
        sleep(config.backoff(attempt)).await;
    }

    Err(anyhow::anyhow!("RPC retry exhausted for {label}").into())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::types::XmrWalletError;

    fn fast(max_retries: usize, timeout_ms: u64) -> RetryConfig {
        RetryConfig {
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter_ms: 0,
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<u32, XmrWalletError> =
            retry_with_timeout("balance", &fast(2, 50), move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(anyhow::anyhow!("connection reset").into())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_and_exhausts_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<(), anyhow::Error> =
            retry_with_timeout("height", &fast(1, 5), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(50)).await;
                    Ok(())
                }
            })
            .await;
        assert!(result.unwrap_err().to_string().contains("timeout"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig {
            jitter_ms: 0,
            ..RetryConfig::default()
        };
        assert_eq!(config.backoff(0), Duration::from_millis(250));
        assert_eq!(config.backoff(10), Duration::from_secs(5));
        assert_eq!(config.backoff(usize::MAX), Duration::from_secs(5));
    }
}
