// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key stores.
//!
//! A [`KeyStore`] hands out [`Key`]s by `kid` (token verification) or by
//! rotation-group `name` (token signing). Stores that support rotation also
//! expose [`KeyRotator`] through [`KeyStore::as_rotator`].
//!
//! | Store | Source | Private keys | Rotation |
//! |-------|--------|--------------|----------|
//! | [`FileKeyStore`] | PEM files | when the file holds them | per name, round robin |
//! | [`StaticKeyStore`] | seeded derivation | yes | global cursor |
//! | [`SingleKeyStore`] | generated at start | yes | no |
//! | [`RemoteKeyStore`] | JWKS endpoint | never | no |

mod file;
mod pem;
mod remote;
mod single;
mod static_keys;

use async_trait::async_trait;

use crate::cache::CacheError;
use crate::jwk::{Key, KeyError};

pub use file::FileKeyStore;
pub use remote::{JwkRequestFactory, JwkSetRequestFactory, RemoteKeyStore, RemoteKeyStoreConfig};
pub use single::{SingleKeyStore, DEFAULT_SINGLE_KID};
pub use static_keys::{StaticKeyStore, DEFAULT_STATIC_KIDS};

/// Errors raised by key stores.
///
/// `Clone` so a cached failure can be returned to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Key with kid [{0}] not found")]
    KidNotFound(String),

    #[error("Key with name [{0}] not found")]
    NameNotFound(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Invalid key file: {0}")]
    KeyFile(String),

    #[error("Unable to build JWKS request: {0}")]
    Request(String),

    #[error("JWKS request failed: {0}")]
    Transport(String),

    #[error("JWKS request failed with status code [{0}]")]
    Status(u16),

    #[error("Invalid JWKS response: {0}")]
    Parse(String),

    #[error("Key cache error: {0}")]
    Cache(String),
}

impl StoreError {
    /// Whether the lookup simply missed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::KidNotFound(_) | StoreError::NameNotFound(_))
    }
}

impl From<CacheError<StoreError>> for StoreError {
    fn from(err: CacheError<StoreError>) -> Self {
        match err {
            CacheError::Load(e) => e,
            other => StoreError::Cache(other.to_string()),
        }
    }
}

/// Source of signing and verification keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Key with the given `kid`.
    async fn load_by_kid(&self, kid: &str) -> Result<Key, StoreError>;

    /// Current key of the rotation group `name`.
    async fn load_by_name(&self, name: &str) -> Result<Key, StoreError>;

    /// Every key belonging to one of `names`, or every key when `names` is
    /// empty.
    async fn load_all(&self, names: &[&str]) -> Result<Vec<Key>, StoreError>;

    /// Rotation capability, when supported.
    fn as_rotator(&self) -> Option<&dyn KeyRotator> {
        None
    }
}

/// Stores whose current key per name can be advanced.
#[async_trait]
pub trait KeyRotator: KeyStore {
    /// Make the next key of `name` current.
    async fn rotate(&self, name: &str) -> Result<(), StoreError>;
}

/// Whether `name` passes a `load_all` name filter.
pub(crate) fn name_selected(names: &[&str], name: &str) -> bool {
    names.is_empty() || names.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_load_errors_unwrap_to_store_errors() {
        let err: StoreError = CacheError::Load(StoreError::Status(503)).into();
        assert_eq!(err, StoreError::Status(503));

        let err: StoreError = CacheError::<StoreError>::Exhausted(3).into();
        assert!(matches!(err, StoreError::Cache(_)));
    }

    #[test]
    fn empty_name_filter_selects_everything() {
        assert!(name_selected(&[], "any"));
        assert!(name_selected(&["a", "b"], "b"));
        assert!(!name_selected(&["a"], "b"));
    }

    #[test]
    fn status_error_message() {
        assert_eq!(
            StoreError::Status(404).to_string(),
            "JWKS request failed with status code [404]"
        );
        assert!(StoreError::KidNotFound("x".into()).is_not_found());
    }
}
