//! Process-level configuration and environment helpers.
//!
//! All configuration is driven by environment variables. Each crate owns the
//! section it consumes; the helpers here keep the parsing rules identical
//! across them.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Process-level configuration for the block responder.
///
/// # Examples
///
/// ```
/// use blockswap_core::PeerConfig;
///
/// let config = PeerConfig::builder().listen_address("127.0.0.1:0".to_owned()).build();
/// assert_eq!(config.log_level, "info");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    /// Bind address for the peer listener.
    #[builder(default = String::from("0.0.0.0:3000"))]
    pub listen_address: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            listen_address: String::from("0.0.0.0:3000"),
            log_level: String::from("info"),
        }
    }
}

impl PeerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `LISTEN_ADDRESS` | `0.0.0.0:3000` |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_address: env_string("LISTEN_ADDRESS", &defaults.listen_address),
            log_level: env_string("LOG_LEVEL", &defaults.log_level),
        }
    }
}

/// Read a boolean flag; `1`, `true` and `yes` (any case) are truthy.
#[must_use]
pub fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map_or(default, |v| parse_bool(&v))
}

/// Read and parse a value, falling back to `default` when unset or unparsable.
#[must_use]
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a string value, falling back to `default` when unset.
#[must_use]
pub fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = PeerConfig::default();
        assert_eq!(config.listen_address, "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_should_parse_truthy_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" yes "));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
    }

    #[test]
    fn test_should_fall_back_when_variable_is_unset() {
        let value: usize = env_parse("BLOCKSWAP_TEST_SURELY_UNSET_VARIABLE", 17);
        assert_eq!(value, 17);
        assert!(env_bool("BLOCKSWAP_TEST_SURELY_UNSET_VARIABLE", true));
    }
}
