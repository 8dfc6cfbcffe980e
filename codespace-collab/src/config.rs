//! Environment-supplied configuration.
//!
//! | Variable | Used by | Default |
//! |----------|---------|---------|
//! | `CODESPACE_BIND_ADDR` | server | `127.0.0.1:9090` |
//! | `CODESPACE_BROADCAST_CAPACITY` | server | `256` |
//! | `CODESPACE_SERVER_URL` | client | `ws://127.0.0.1:9090` |
//!
//! Lookups go through a closure so parsing can be tested without touching
//! the process environment.

use std::str::FromStr;

use thiserror::Error;

pub const BIND_ADDR_VAR: &str = "CODESPACE_BIND_ADDR";
pub const BROADCAST_CAPACITY_VAR: &str = "CODESPACE_BROADCAST_CAPACITY";
pub const SERVER_URL_VAR: &str = "CODESPACE_SERVER_URL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Read `var` through `lookup`, falling back to `default` when unset.
pub(crate) fn parse_var<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            reason: "could not be parsed",
        }),
    }
}

/// Process environment lookup.
pub(crate) fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}
