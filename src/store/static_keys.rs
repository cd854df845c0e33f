// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deterministic key store for development and tests.
//!
//! Every `kid` in the seed list maps to a key derived from a generator seeded
//! with SHA-256 of the `kid`, so two stores built from the same list hand out
//! identical keys. Keys are derived lazily and kept for the store's lifetime.
//!
//! ## Security
//!
//! Anyone who knows a seed can recompute its private key. Never use this store
//! outside local development and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{name_selected, KeyRotator, KeyStore, StoreError};
use crate::jwk::{generate_compatible_key_with, Key, SigningAlgorithm};

/// Seeds used by [`StaticKeyStore::default`].
pub const DEFAULT_STATIC_KIDS: [&str; 3] = ["kid1", "kid2", "kid3"];

struct StaticState {
    keys: HashMap<String, Key>,
    current: usize,
}

/// Key store deriving one key per seed `kid`.
///
/// `load_by_name` ignores the name and returns the current key; `rotate`
/// advances a single cursor over the seed list.
pub struct StaticKeyStore {
    kids: Vec<String>,
    algorithm: SigningAlgorithm,
    state: Mutex<StaticState>,
}

impl Default for StaticKeyStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATIC_KIDS)
    }
}

impl StaticKeyStore {
    /// Create a store over `kids`. An empty list falls back to
    /// [`DEFAULT_STATIC_KIDS`].
    pub fn new<I, S>(kids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kids: Vec<String> = kids.into_iter().map(Into::into).collect();
        if kids.is_empty() {
            kids = DEFAULT_STATIC_KIDS.iter().map(|s| s.to_string()).collect();
        }
        Self {
            kids,
            algorithm: SigningAlgorithm::RS256,
            state: Mutex::new(StaticState {
                keys: HashMap::new(),
                current: 0,
            }),
        }
    }

    /// Derive keys for `algorithm` instead of RS256.
    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn kids(&self) -> &[String] {
        &self.kids
    }

    /// Key at the rotation cursor.
    pub async fn current(&self) -> Result<Key, StoreError> {
        let kid = {
            let state = self.lock();
            self.kids[state.current % self.kids.len()].clone()
        };
        self.derive(&kid).await
    }

    fn lock(&self) -> MutexGuard<'_, StaticState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached key for `kid`, generating it off the async workers on a miss.
    /// Concurrent misses may both generate; the first insert wins.
    async fn derive(&self, kid: &str) -> Result<Key, StoreError> {
        if let Some(key) = self.lock().keys.get(kid) {
            return Ok(key.clone());
        }

        let algorithm = self.algorithm;
        let seed: [u8; 32] = Sha256::digest(kid.as_bytes()).into();
        let private = tokio::task::spawn_blocking(move || {
            generate_compatible_key_with(algorithm, &mut StdRng::from_seed(seed))
        })
        .await
        .map_err(|e| StoreError::KeyFile(format!("static key generation failed: {e}")))??;

        let key = Key::with_private(kid, kid, private);
        Ok(self
            .lock()
            .keys
            .entry(kid.to_string())
            .or_insert(key)
            .clone())
    }
}

#[async_trait]
impl KeyStore for StaticKeyStore {
    async fn load_by_kid(&self, kid: &str) -> Result<Key, StoreError> {
        if !self.kids.iter().any(|k| k == kid) {
            return Err(StoreError::KidNotFound(kid.to_string()));
        }
        self.derive(kid).await
    }

    async fn load_by_name(&self, _name: &str) -> Result<Key, StoreError> {
        self.current().await
    }

    async fn load_all(&self, names: &[&str]) -> Result<Vec<Key>, StoreError> {
        let mut keys = Vec::new();
        for kid in self.kids.iter().filter(|kid| name_selected(names, kid)) {
            keys.push(self.derive(kid).await?);
        }
        Ok(keys)
    }

    fn as_rotator(&self) -> Option<&dyn KeyRotator> {
        Some(self)
    }
}

#[async_trait]
impl KeyRotator for StaticKeyStore {
    async fn rotate(&self, _name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.current = (state.current + 1) % self.kids.len();
        info!(kid = %self.kids[state.current], "Rotated static signing key");
        Ok(())
    }
}
