// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the property structs key stores
//! are built from.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `JWT_KEYS_CONFIG` | JSON file with [`CryptoProperties`] | Required by the CLI |
//! | `JWT_JWKS_URL` | Remote JWKS endpoint | `http://localhost:8900/auth/v2/jwks` |
//! | `JWT_JWK_BASE_URL` | Per-kid endpoint base (`{base}/{kid}`) | Unset |
//! | `JWT_JWKS_CACHE` | Cache remote keys (`true` / `false`) | `true` |
//! | `JWT_JWKS_CACHE_TTL_SECS` | Remote key cache TTL | `3600` |
//! | `JWT_JWKS_RETRY` | Extra cache load attempts | `2` |
//! | `JWT_JWKS_RETRY_BACKOFF_SECS` | How long a failed fetch stays cached | `2` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Path of the JSON key configuration read by the CLI.
pub const KEYS_CONFIG_ENV: &str = "JWT_KEYS_CONFIG";

pub const JWKS_URL_ENV: &str = "JWT_JWKS_URL";
pub const JWK_BASE_URL_ENV: &str = "JWT_JWK_BASE_URL";
pub const JWKS_CACHE_ENV: &str = "JWT_JWKS_CACHE";
pub const JWKS_CACHE_TTL_ENV: &str = "JWT_JWKS_CACHE_TTL_SECS";
pub const JWKS_RETRY_ENV: &str = "JWT_JWKS_RETRY";
pub const JWKS_RETRY_BACKOFF_ENV: &str = "JWT_JWKS_RETRY_BACKOFF_SECS";

/// Logging format selector (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default remote JWKS endpoint.
pub const DEFAULT_JWKS_URL: &str = "http://localhost:8900/auth/v2/jwks";

/// Default remote key cache TTL (60 minutes).
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default time a failed fetch stays cached before it is retried.
pub const DEFAULT_JWKS_RETRY_BACKOFF: Duration = Duration::from_secs(2);

pub const DEFAULT_JWKS_RETRY: usize = 2;

/// Key name the encoder signs with unless configured otherwise.
pub const DEFAULT_KEY_NAME: &str = "default";

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },

    #[error("Unable to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid key configuration: {0}")]
    Parse(String),
}

/// One key file entry, keyed by logical key name.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFileProperties {
    /// Prefix for generated kids (`{id}-{index}`). Digest-based kids otherwise.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_key_format")]
    pub format: String,
    pub file: PathBuf,
    /// Password for `ENCRYPTED PRIVATE KEY` blocks.
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for KeyFileProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFileProperties")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("file", &self.file)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_key_format() -> String {
    "pem".to_string()
}

/// Token settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtProperties {
    /// Key name (and default kid) used for signing.
    #[serde(default = "default_key_name")]
    pub key_name: String,
}

impl Default for JwtProperties {
    fn default() -> Self {
        Self {
            key_name: default_key_name(),
        }
    }
}

fn default_key_name() -> String {
    DEFAULT_KEY_NAME.to_string()
}

/// Key material configuration.
///
/// ```json
/// {
///   "keys": {
///     "jwt": { "id": "dev", "file": "/etc/auth/jwt.pem" }
///   },
///   "jwt": { "key_name": "jwt" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoProperties {
    #[serde(default)]
    pub keys: BTreeMap<String, KeyFileProperties>,
    #[serde(default)]
    pub jwt: JwtProperties,
}

impl CryptoProperties {
    /// Read from a JSON file. Relative key file paths resolve against the
    /// configuration file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut props: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(dir) = path.parent() {
            for entry in props.keys.values_mut() {
                if entry.file.is_relative() {
                    entry.file = dir.join(&entry.file);
                }
            }
        }
        Ok(props)
    }

    /// Read the file named by `JWT_KEYS_CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(KEYS_CONFIG_ENV).map_err(|_| ConfigError::Missing(KEYS_CONFIG_ENV))?;
        Self::from_file(Path::new(&path))
    }
}

/// Remote JWKS settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJwksProperties {
    pub jwk_set_url: String,
    #[serde(default)]
    pub jwk_base_url: Option<String>,
    pub cache_enabled: bool,
    pub ttl_secs: u64,
    pub retry: usize,
    pub retry_backoff_secs: u64,
}

impl Default for RemoteJwksProperties {
    fn default() -> Self {
        Self {
            jwk_set_url: DEFAULT_JWKS_URL.to_string(),
            jwk_base_url: None,
            cache_enabled: true,
            ttl_secs: DEFAULT_JWKS_CACHE_TTL.as_secs(),
            retry: DEFAULT_JWKS_RETRY,
            retry_backoff_secs: DEFAULT_JWKS_RETRY_BACKOFF.as_secs(),
        }
    }
}

impl RemoteJwksProperties {
    /// Defaults overridden by whichever `JWT_JWK*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut props = Self::default();
        if let Some(url) = lookup(JWKS_URL_ENV) {
            props.jwk_set_url = url;
        }
        props.jwk_base_url = lookup(JWK_BASE_URL_ENV).filter(|v| !v.is_empty());
        if let Some(v) = lookup(JWKS_CACHE_ENV) {
            props.cache_enabled = parse_var(JWKS_CACHE_ENV, &v)?;
        }
        if let Some(v) = lookup(JWKS_CACHE_TTL_ENV) {
            props.ttl_secs = parse_var(JWKS_CACHE_TTL_ENV, &v)?;
        }
        if let Some(v) = lookup(JWKS_RETRY_ENV) {
            props.retry = parse_var(JWKS_RETRY_ENV, &v)?;
        }
        if let Some(v) = lookup(JWKS_RETRY_BACKOFF_ENV) {
            props.retry_backoff_secs = parse_var(JWKS_RETRY_BACKOFF_ENV, &v)?;
        }
        Ok(props)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}
