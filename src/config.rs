//! Runtime configuration and launcher environment helpers.
//!
//! The launcher environment is read from `FERROCOMM_*` variables. Helpers
//! return `None` if the variable is not set or does not parse.
//!
//! # Environment Variables
//!
//! | Function | Variable | Description |
//! |----------|----------|-------------|
//! | `world_size()` | `FERROCOMM_NP` | Number of ranks to launch |
//! | `eager_limit()` | `FERROCOMM_EAGER_LIMIT` | Largest buffered message, in bytes |
//! | `deadlock_timeout()` | `FERROCOMM_TIMEOUT_MS` | Blocking-operation timeout |

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Variable holding the number of ranks to launch.
pub const NP_VAR: &str = "FERROCOMM_NP";
/// Variable holding the eager (buffered) delivery limit in bytes.
pub const EAGER_LIMIT_VAR: &str = "FERROCOMM_EAGER_LIMIT";
/// Variable holding the deadlock timeout in milliseconds.
pub const TIMEOUT_VAR: &str = "FERROCOMM_TIMEOUT_MS";

/// Get the world size requested by the launcher.
pub fn world_size() -> Option<i32> {
    env::var(NP_VAR).ok().and_then(|s| s.trim().parse().ok())
}

/// Get the eager delivery limit in bytes.
pub fn eager_limit() -> Option<usize> {
    env::var(EAGER_LIMIT_VAR)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Get the deadlock timeout. A value of `0` means "wait forever".
pub fn deadlock_timeout() -> Option<Duration> {
    env::var(TIMEOUT_VAR)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Settings shared by every rank of a universe.
///
/// # Delivery
///
/// Point-to-point messages whose payload is at most `eager_limit` bytes are
/// buffered: the blocking send returns as soon as the message is queued at
/// the destination. Larger messages (and every message when the limit is
/// `0`) use rendezvous delivery: the send only returns once the destination
/// has matched the message with a receive. Rendezvous delivery is what makes
/// two ranks that both send first block on each other.
///
/// # Deadlock timeout
///
/// Blocking operations never time out by default, just like the underlying
/// model. With a timeout set, a rank blocked for longer than the timeout
/// gives up with [`Error::Timeout`](crate::Error::Timeout), which turns a
/// hang into an observable result.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use ferrocomm::RuntimeConfig;
///
/// let config = RuntimeConfig::default()
///     .with_eager_limit(64)
///     .with_deadlock_timeout(Duration::from_millis(200));
/// assert!(config.is_eager(8));
/// assert!(!config.is_eager(65));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeConfig {
    /// Largest payload, in bytes, that is delivered without a rendezvous.
    /// `0` disables buffering.
    pub eager_limit: usize,
    /// How long a blocking operation may wait before failing.
    pub deadlock_timeout: Option<Duration>,
}

impl RuntimeConfig {
    /// Build a configuration from the `FERROCOMM_*` environment variables,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Self {
        RuntimeConfig {
            eager_limit: eager_limit().unwrap_or(0),
            deadlock_timeout: deadlock_timeout(),
        }
    }

    /// Set the eager delivery limit in bytes.
    pub fn with_eager_limit(mut self, bytes: usize) -> Self {
        self.eager_limit = bytes;
        self
    }

    /// Set the deadlock timeout.
    pub fn with_deadlock_timeout(mut self, timeout: Duration) -> Self {
        self.deadlock_timeout = Some(timeout);
        self
    }

    /// Whether a payload of `bytes` bytes is buffered.
    pub fn is_eager(&self, bytes: usize) -> bool {
        self.eager_limit > 0 && bytes <= self.eager_limit
    }

    /// Check that the configuration can drive a universe.
    pub fn validate(&self) -> Result<()> {
        if self.deadlock_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "deadlock timeout must be positive; leave it unset to wait forever".into(),
            ));
        }
        Ok(())
    }
}
