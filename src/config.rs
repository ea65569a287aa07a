use crate::error::{LifecycleError, Result};
use std::env;
use std::time::Duration;

/// Timing and retry knobs for the lifecycle jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// Delay between initiation and the expiry signal that escrows the transaction.
    pub escrow_delay: Duration,
    /// Fallback sweep moving stuck INITIATED transactions to escrow.
    pub escrow_sweep_interval: Duration,
    /// How often the work queue is drained.
    pub queue_drain_interval: Duration,
    /// Bounded wait for each dequeue.
    pub queue_poll_timeout: Duration,
    pub retry_interval: Duration,
    pub settlement_interval: Duration,
    pub max_retries: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            escrow_delay: Duration::from_secs(60),
            escrow_sweep_interval: Duration::from_secs(60),
            queue_drain_interval: Duration::from_secs(30),
            queue_poll_timeout: Duration::from_secs(2),
            retry_interval: Duration::from_secs(60),
            settlement_interval: Duration::from_secs(300),
            max_retries: 3,
        }
    }
}

impl LifecycleConfig {
    /// Reads `TRACKTROVE_*` variables on top of the defaults. Durations are in
    /// milliseconds.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| LifecycleError::ValidationError(format!("{key}: {e}"))),
                None => Ok(default),
            }
        };

        let max_retries = match lookup("TRACKTROVE_MAX_RETRIES") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
                LifecycleError::ValidationError(format!("TRACKTROVE_MAX_RETRIES: {e}"))
            })?,
            None => defaults.max_retries,
        };

        Ok(Self {
            escrow_delay: millis("TRACKTROVE_ESCROW_DELAY_MS", defaults.escrow_delay)?,
            escrow_sweep_interval: millis(
                "TRACKTROVE_ESCROW_SWEEP_INTERVAL_MS",
                defaults.escrow_sweep_interval,
            )?,
            queue_drain_interval: millis(
                "TRACKTROVE_QUEUE_DRAIN_INTERVAL_MS",
                defaults.queue_drain_interval,
            )?,
            queue_poll_timeout: millis(
                "TRACKTROVE_QUEUE_POLL_TIMEOUT_MS",
                defaults.queue_poll_timeout,
            )?,
            retry_interval: millis("TRACKTROVE_RETRY_INTERVAL_MS", defaults.retry_interval)?,
            settlement_interval: millis(
                "TRACKTROVE_SETTLEMENT_INTERVAL_MS",
                defaults.settlement_interval,
            )?,
            max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = LifecycleConfig::default();
        assert_eq!(config.escrow_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.retry_interval, Duration::from_secs(60));
        assert_eq!(config.settlement_interval, Duration::from_secs(300));
        assert_eq!(config.queue_poll_timeout, Duration::from_secs(2));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TRACKTROVE_ESCROW_DELAY_MS", "250"),
            ("TRACKTROVE_MAX_RETRIES", "5"),
        ]);
        let config =
            LifecycleConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.escrow_delay, Duration::from_millis(250));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.settlement_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let result = LifecycleConfig::from_lookup(|key| {
            (key == "TRACKTROVE_RETRY_INTERVAL_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(LifecycleError::ValidationError(_))));
    }
}
