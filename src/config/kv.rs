//! Key-value bucket naming and watch tuning
//!
//! A bucket `B` is backed by the stream `{stream_prefix}B` and every key `K`
//! of it lives on the subject `{subject_prefix}.B.K`.
//!
//! ```toml
//! [kv]
//! stream_prefix = "KV_"
//! subject_prefix = "$KV"
//!
//! [watch]
//! collect_timeout_ms = 5000
//! ```

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KvConfig {
    /// Prefix prepended to the bucket name to form its stream name
    ///
    /// Default: "KV_"
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,

    /// First subject token of every key subject
    ///
    /// Default: "$KV"
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            stream_prefix: default_stream_prefix(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

impl KvConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stream_prefix.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "kv.stream_prefix must not be empty".into(),
            )));
        }

        if self.subject_prefix.is_empty()
            || self.subject_prefix.starts_with('.')
            || self.subject_prefix.ends_with('.')
            || self.subject_prefix.contains(['*', '>', ' '])
        {
            return Err(Error::Config(ConfigError::Message(format!(
                "kv.subject_prefix {:?} is not a valid literal subject",
                self.subject_prefix
            ))));
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Upper bound for helpers that drain a watch until end-of-data
    /// (`KvStore::keys`, `KvStore::history`)
    ///
    /// Default: 5000
    #[serde(default = "default_collect_timeout_ms")]
    pub collect_timeout_ms: u64,

    /// Optional name prefix for the ordered consumers created by watches.
    /// When unset the stream context picks the consumer name.
    #[serde(default)]
    pub consumer_name_prefix: Option<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            collect_timeout_ms: default_collect_timeout_ms(),
            consumer_name_prefix: None,
        }
    }
}

impl WatchConfig {
    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collect_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.collect_timeout_ms must be greater than 0".into(),
            )));
        }

        if let Some(prefix) = &self.consumer_name_prefix {
            if prefix.is_empty() || prefix.contains(['.', '*', '>', ' ']) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "watch.consumer_name_prefix {prefix:?} is not a valid consumer name"
                ))));
            }
        }

        Ok(())
    }
}

fn default_stream_prefix() -> String {
    "KV_".into()
}

fn default_subject_prefix() -> String {
    "$KV".into()
}

fn default_collect_timeout_ms() -> u64 {
    5000
}
