// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key store holding one key generated at startup.

use async_trait::async_trait;

use super::{name_selected, KeyStore, StoreError};
use crate::jwk::{generate_compatible_key, Key, KeyError, SigningAlgorithm};

/// Default `kid` (and name) of the generated key.
pub const DEFAULT_SINGLE_KID: &str = "default";

/// Store with a single ephemeral signing key.
///
/// The key lives only as long as the process, so tokens signed with it stop
/// verifying after a restart.
#[derive(Debug, Clone)]
pub struct SingleKeyStore {
    key: Key,
}

impl SingleKeyStore {
    /// Generate an RS256 key with kid `"default"`.
    pub fn new() -> Result<Self, KeyError> {
        Self::generate(DEFAULT_SINGLE_KID, SigningAlgorithm::RS256)
    }

    /// Generate a key for `algorithm` with the given kid (also its name).
    pub fn generate(kid: impl Into<String>, algorithm: SigningAlgorithm) -> Result<Self, KeyError> {
        let kid = kid.into();
        let private = generate_compatible_key(algorithm)?;
        Ok(Self {
            key: Key::with_private(kid.clone(), kid, private),
        })
    }

    pub fn key(&self) -> &Key {
        &self.key
    }
}

#[async_trait]
impl KeyStore for SingleKeyStore {
    async fn load_by_kid(&self, kid: &str) -> Result<Key, StoreError> {
        if kid != self.key.kid() {
            return Err(StoreError::KidNotFound(kid.to_string()));
        }
        Ok(self.key.clone())
    }

    async fn load_by_name(&self, name: &str) -> Result<Key, StoreError> {
        if name != self.key.name() {
            return Err(StoreError::NameNotFound(name.to_string()));
        }
        Ok(self.key.clone())
    }

    async fn load_all(&self, names: &[&str]) -> Result<Vec<Key>, StoreError> {
        if !name_selected(names, self.key.name()) {
            return Ok(Vec::new());
        }
        Ok(vec![self.key.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_only_its_key() {
        let store = SingleKeyStore::generate("default", SigningAlgorithm::EdDSA).unwrap();
        let key = store.load_by_kid("default").await.unwrap();
        assert!(key.private().is_some());
        assert_eq!(key.name(), "default");
        assert_eq!(store.load_by_name("default").await.unwrap(), key);

        assert!(store.load_by_kid("other").await.unwrap_err().is_not_found());
        assert!(store.load_by_name("other").await.unwrap_err().is_not_found());
        assert!(store.as_rotator().is_none());
    }

    #[tokio::test]
    async fn load_all_respects_filter() {
        let store = SingleKeyStore::generate("k", SigningAlgorithm::HS256).unwrap();
        assert_eq!(store.load_all(&[]).await.unwrap().len(), 1);
        assert_eq!(store.load_all(&["k"]).await.unwrap().len(), 1);
        assert!(store.load_all(&["x"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn instances_differ() {
        let a = SingleKeyStore::generate("k", SigningAlgorithm::ES256).unwrap();
        let b = SingleKeyStore::generate("k", SigningAlgorithm::ES256).unwrap();
        assert_ne!(a.key().public(), b.key().public());
    }
}
