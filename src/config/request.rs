use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Upper bound for a library-imposed request deadline (1 hour)
const MAX_DEFAULT_TIMEOUT_MS: u64 = 3_600_000;

/// Defaults applied to requests registered without an explicit timeout
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestConfig {
    /// Deadline applied when the caller does not pass one.
    ///
    /// `0` disables the internal timer: such requests only finish on a reply,
    /// a caller cancellation or disposal.
    ///
    /// Default: 5000
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl RequestConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_ms > MAX_DEFAULT_TIMEOUT_MS {
            return Err(Error::Config(ConfigError::Message(format!(
                "request.default_timeout_ms {} exceeds maximum {}ms",
                self.default_timeout_ms, MAX_DEFAULT_TIMEOUT_MS
            ))));
        }
        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    5000
}
