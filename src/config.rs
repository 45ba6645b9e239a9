//! Server configuration.
//!
//! A [`Config`] is an explicit value handed to [`Server::new`](crate::Server::new);
//! nothing is read from process-global state. Every field has a default, so a
//! minimal TOML file (or none at all) is valid:
//!
//! ```toml
//! listen = "127.0.0.1:8080"
//! multipart_limit = 1048576
//!
//! [policy]
//! coercion = "strict"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Upper bound for a buffered multipart body: 32 MiB.
pub const DEFAULT_MULTIPART_LIMIT: u64 = 32 << 20;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// `host:port` used by [`Server::serve`](crate::Server::serve).
    pub listen: String,

    /// Maximum size in bytes of a buffered request body. Bodies are cut off
    /// while streaming in, so multipart uploads never exceed it in memory.
    pub multipart_limit: u64,

    /// Append captured backtraces to `500` response bodies.
    pub expose_traces: bool,

    pub policy: Policy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_owned(),
            multipart_limit: DEFAULT_MULTIPART_LIMIT,
            expose_traces: true,
            policy: Policy::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// The lenient behaviours of binding and response translation, in one place.
///
/// The defaults keep every leniency on.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Policy {
    pub coercion: CoercionPolicy,
    pub unknown_reply: UnknownReplyPolicy,
    pub empty_error: EmptyErrorPolicy,
}

/// What to do when a present value does not parse as the field's type.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CoercionPolicy {
    /// Leave the field at its default value.
    #[default]
    Lenient,
    /// Fail binding.
    Strict,
}

/// What to do with a [`Reply::Other`](crate::Reply::Other).
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReplyPolicy {
    /// Write nothing.
    #[default]
    Drop,
    /// Serialize the value as JSON.
    Json,
}

/// What to do with a [`HandlerError::Failure`](crate::HandlerError::Failure)
/// whose message is empty.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EmptyErrorPolicy {
    /// Write nothing.
    #[default]
    Silent,
    /// Answer `500 Internal Server Error`.
    Internal,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
