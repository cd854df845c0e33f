// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key store backed by PEM files.
//!
//! Each configured name points at one PEM file holding one or more keys of
//! the same rotation group. A file holds either private keys or public keys
//! (certificates count as public), never both. Entries that fail to load are
//! logged and skipped so one bad file does not take the store down.
//!
//! ## Key ids
//!
//! - with an explicit `id`: `{id}-{block index}`
//! - otherwise: `{name}-{hex digest}` where the digest is SHA-224 over the
//!   public material (HMAC-SHA256 of the name for symmetric secrets)

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha224, Sha256};
use tracing::{debug, info, warn};

use super::pem::{parse_pem_keys, PemKey};
use super::{name_selected, KeyRotator, KeyStore, StoreError};
use crate::config::KeyFileProperties;
use crate::jwk::marshal::ec_coordinates;
use crate::jwk::{Key, PublicKey};

const PEM_FORMAT: &str = "pem";

/// File-backed [`KeyStore`] with per-name round-robin rotation.
pub struct FileKeyStore {
    by_kid: HashMap<String, Key>,
    by_name: BTreeMap<String, Vec<Key>>,
    current: RwLock<HashMap<String, usize>>,
}

impl FileKeyStore {
    /// Load every configured key file.
    ///
    /// Entries that cannot be loaded are skipped with a warning.
    pub fn new<'a>(files: impl IntoIterator<Item = (&'a String, &'a KeyFileProperties)>) -> Self {
        let mut by_kid = HashMap::new();
        let mut by_name = BTreeMap::new();

        for (name, props) in files {
            let keys = match load_key_file(name, props) {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(name = %name, file = %props.file.display(), error = %e, "Skipping key file");
                    continue;
                }
            };

            let mut accepted = Vec::with_capacity(keys.len());
            for key in keys {
                if by_kid.contains_key(key.kid()) {
                    warn!(name = %name, kid = %key.kid(), "Duplicate key id, skipping key");
                    continue;
                }
                by_kid.insert(key.kid().to_string(), key.clone());
                accepted.push(key);
            }
            debug!(name = %name, count = accepted.len(), "Loaded key file");
            if !accepted.is_empty() {
                by_name.insert(name.clone(), accepted);
            }
        }

        Self {
            by_kid,
            by_name,
            current: RwLock::new(HashMap::new()),
        }
    }

    /// Names with at least one loaded key.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    fn current_index(&self, name: &str) -> usize {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        current.get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn load_by_kid(&self, kid: &str) -> Result<Key, StoreError> {
        self.by_kid
            .get(kid)
            .cloned()
            .ok_or_else(|| StoreError::KidNotFound(kid.to_string()))
    }

    async fn load_by_name(&self, name: &str) -> Result<Key, StoreError> {
        let keys = self
            .by_name
            .get(name)
            .ok_or_else(|| StoreError::NameNotFound(name.to_string()))?;
        let index = self.current_index(name) % keys.len();
        Ok(keys[index].clone())
    }

    async fn load_all(&self, names: &[&str]) -> Result<Vec<Key>, StoreError> {
        Ok(self
            .by_name
            .iter()
            .filter(|(name, _)| name_selected(names, name))
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect())
    }

    fn as_rotator(&self) -> Option<&dyn KeyRotator> {
        Some(self)
    }
}

#[async_trait]
impl KeyRotator for FileKeyStore {
    async fn rotate(&self, name: &str) -> Result<(), StoreError> {
        let keys = self
            .by_name
            .get(name)
            .ok_or_else(|| StoreError::NameNotFound(name.to_string()))?;
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let index = current.entry(name.to_string()).or_insert(0);
        *index = (*index + 1) % keys.len();
        info!(name = %name, kid = %keys[*index].kid(), "Rotated signing key");
        Ok(())
    }
}

/// Read one configured key file.
fn load_key_file(name: &str, props: &KeyFileProperties) -> Result<Vec<Key>, StoreError> {
    if !props.format.eq_ignore_ascii_case(PEM_FORMAT) {
        return Err(StoreError::KeyFile(format!(
            "unsupported key file format [{}]",
            props.format
        )));
    }
    let data = std::fs::read(&props.file).map_err(|e| StoreError::KeyFile(e.to_string()))?;
    keys_from_pem(name, props.id.as_deref(), &data, props.password.as_deref())
}

/// Build keys for `name` from PEM content.
pub(crate) fn keys_from_pem(
    name: &str,
    id: Option<&str>,
    data: &[u8],
    password: Option<&str>,
) -> Result<Vec<Key>, StoreError> {
    let blocks = parse_pem_keys(data, password)?;
    if blocks.is_empty() {
        return Err(StoreError::KeyFile("no keys found in PEM".to_string()));
    }

    let privates = blocks.iter().filter(|b| matches!(b, PemKey::Private(_))).count();
    if privates != 0 && privates != blocks.len() {
        return Err(StoreError::KeyFile(
            "PEM mixes private and public keys".to_string(),
        ));
    }

    blocks
        .into_iter()
        .enumerate()
        .map(|(index, block)| {
            let public = match &block {
                PemKey::Private(k) => k.public_key(),
                PemKey::Public(k) => k.clone(),
            };
            let kid = match id {
                Some(id) => format!("{id}-{index}"),
                None => format!("{name}-{}", key_digest(name, &public)?),
            };
            Ok(match block {
                PemKey::Private(k) => Key::with_private(kid, name, k),
                PemKey::Public(k) => Key::new(kid, name, k),
            })
        })
        .collect()
}

/// Hex digest identifying public key material.
fn key_digest(name: &str, public: &PublicKey) -> Result<String, StoreError> {
    let digest = match public {
        PublicKey::Rsa(k) => {
            let exponent = k
                .e()
                .to_bytes_be()
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            let mut hasher = Sha224::new();
            hasher.update(k.n().to_bytes_be());
            hasher.update((exponent as i64).to_le_bytes());
            hasher.finalize().to_vec()
        }
        PublicKey::Ec(k) => {
            let (x, y) = ec_coordinates(k)?;
            let mut hasher = Sha224::new();
            hasher.update(trim_leading_zeros(&x));
            hasher.update(trim_leading_zeros(&y));
            hasher.finalize().to_vec()
        }
        PublicKey::Ed25519(k) => Sha224::digest(k.as_bytes()).to_vec(),
        PublicKey::Secret(secret) => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                .map_err(|e| StoreError::KeyFile(e.to_string()))?;
            mac.update(name.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        PublicKey::Custom(k) => {
            return Err(StoreError::KeyFile(format!(
                "unsupported key type [{}]",
                k.key_type()
            )));
        }
    };
    Ok(hex::encode(digest))
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::{generate_compatible_key, PrivateKey, SigningAlgorithm};
    use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use std::path::PathBuf;

    fn ed25519_pem() -> String {
        let key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
    }

    fn props(file: PathBuf, id: Option<&str>) -> KeyFileProperties {
        KeyFileProperties {
            id: id.map(str::to_string),
            format: "pem".to_string(),
            file,
            password: None,
        }
    }

    #[test]
    fn explicit_id_numbers_blocks() {
        let pem = format!("{}{}", ed25519_pem(), ed25519_pem());
        let keys = keys_from_pem("web", Some("k"), pem.as_bytes(), None).unwrap();
        let kids: Vec<_> = keys.iter().map(Key::kid).collect();
        assert_eq!(kids, ["k-0", "k-1"]);
        assert!(keys.iter().all(|k| k.name() == "web" && k.private().is_some()));
    }

    #[test]
    fn digest_kid_is_stable() {
        let pem = ed25519_pem();
        let a = keys_from_pem("web", None, pem.as_bytes(), None).unwrap();
        let b = keys_from_pem("web", None, pem.as_bytes(), None).unwrap();
        assert_eq!(a[0].kid(), b[0].kid());
        let suffix = a[0].kid().strip_prefix("web-").unwrap();
        assert_eq!(suffix.len(), 56);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hmac_kid_depends_on_name() {
        let block = pem::encode(&pem::Pem::new("HMAC KEY", vec![9u8; 32]));
        let a = keys_from_pem("a", None, block.as_bytes(), None).unwrap();
        let b = keys_from_pem("b", None, block.as_bytes(), None).unwrap();
        assert_ne!(
            a[0].kid().strip_prefix("a-").unwrap(),
            b[0].kid().strip_prefix("b-").unwrap()
        );
        // HMAC-SHA256, hex encoded.
        assert_eq!(a[0].kid().len(), "a-".len() + 64);
    }

    #[test]
    fn mixed_blocks_are_rejected() {
        let private = ed25519_pem();
        let public = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng)
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let err = keys_from_pem("n", None, format!("{private}{public}").as_bytes(), None)
            .unwrap_err();
        assert_eq!(err, StoreError::KeyFile("PEM mixes private and public keys".into()));
    }

    #[test]
    fn empty_file_is_rejected() {
        let err = keys_from_pem("n", None, b"", None).unwrap_err();
        assert_eq!(err, StoreError::KeyFile("no keys found in PEM".into()));
    }

    #[tokio::test]
    async fn broken_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pem");
        std::fs::write(&good, ed25519_pem()).unwrap();
        let empty = dir.path().join("empty.pem");
        std::fs::write(&empty, "").unwrap();

        let mut files = HashMap::new();
        files.insert("good".to_string(), props(good, Some("g")));
        files.insert("empty".to_string(), props(empty, None));
        files.insert("missing".to_string(), props(dir.path().join("nope.pem"), None));
        let mut jks = props(dir.path().join("good.pem"), None);
        jks.format = "jks".to_string();
        files.insert("jks".to_string(), jks);

        let store = FileKeyStore::new(&files);
        assert_eq!(store.names().collect::<Vec<_>>(), ["good"]);
        assert!(store.load_by_kid("g-0").await.is_ok());
        assert_eq!(
            store.load_by_name("empty").await.unwrap_err(),
            StoreError::NameNotFound("empty".into())
        );
    }

    #[tokio::test]
    async fn rotation_cycles_through_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("keys.pem");
        let pem: String = (0..3)
            .map(|_| {
                let key = generate_compatible_key(SigningAlgorithm::ES256).unwrap();
                match key {
                    PrivateKey::Ec(crate::jwk::EcPrivateKey::P256(k)) => {
                        k.to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
                    }
                    _ => unreachable!(),
                }
            })
            .collect();
        std::fs::write(&file, pem).unwrap();

        let mut files = HashMap::new();
        files.insert("signing".to_string(), props(file, Some("k")));
        let store = FileKeyStore::new(&files);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(store.load_by_name("signing").await.unwrap().kid().to_string());
            store.rotate("signing").await.unwrap();
        }
        assert_eq!(seen, ["k-0", "k-1", "k-2", "k-0"]);

        assert!(store.rotate("unknown").await.unwrap_err().is_not_found());
        assert_eq!(store.load_all(&[]).await.unwrap().len(), 3);
        assert!(store.load_all(&["other"]).await.unwrap().is_empty());
    }
}
