// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token signing.

use std::sync::Arc;

use jsonwebtoken::{EncodingKey, Header};
use pkcs8::EncodePrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use serde::Serialize;
use tracing::debug;

use super::header::HeaderMembers;
use super::{es512, EncodeError};
use crate::jwk::{resolve_signing_algorithm, EcPrivateKey, Key, PrivateKey, SigningAlgorithm};
use crate::store::KeyStore;

/// Signs claims with the current key of a configured key name.
///
/// With a rotating store the current key of `key_name` is used; otherwise the
/// key whose kid is `key_name`. The header carries `kid` only when the key's
/// id differs from `key_name`, which a decoder configured with the same name
/// falls back to.
#[derive(Clone)]
pub struct JwtEncoder {
    store: Arc<dyn KeyStore>,
    key_name: String,
    algorithm: Option<SigningAlgorithm>,
}

impl JwtEncoder {
    pub fn new(store: Arc<dyn KeyStore>, key_name: impl Into<String>) -> Self {
        Self {
            store,
            key_name: key_name.into(),
            algorithm: None,
        }
    }

    /// Sign with `algorithm` instead of deriving it from the key.
    ///
    /// Encoding fails when the current key cannot produce it.
    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Sign `claims` and return the compact serialization.
    pub async fn encode<T: Serialize>(&self, claims: &T) -> Result<String, EncodeError> {
        let key = self.signing_key().await?;
        let private = key
            .private()
            .ok_or_else(|| EncodeError::MissingPrivateKey(key.kid().to_string()))?;

        let algorithm = match self.algorithm {
            Some(alg) if alg.is_compatible_with(key.public()) => alg,
            Some(alg) => {
                return Err(EncodeError::IncompatibleAlgorithm {
                    alg: alg.to_string(),
                    kty: key.public().key_type().to_string(),
                })
            }
            None => resolve_signing_algorithm(private)?,
        };
        let kid = (key.kid() != self.key_name).then(|| key.kid());
        debug!(kid = %key.kid(), alg = %algorithm, "Signing token");

        match (algorithm.to_jsonwebtoken(), private) {
            (Some(alg), _) => {
                let mut header = Header::new(alg);
                header.kid = kid.map(str::to_string);
                let encoding_key = encoding_key(private)?;
                jsonwebtoken::encode(&header, claims, &encoding_key)
                    .map_err(|e| EncodeError::Signing(e.to_string()))
            }
            (None, PrivateKey::Ec(EcPrivateKey::P521(secret))) => {
                let header = serde_json::to_vec(&HeaderMembers {
                    typ: "JWT",
                    alg: algorithm.as_str(),
                    kid,
                })
                .map_err(|e| EncodeError::Signing(e.to_string()))?;
                let payload =
                    serde_json::to_vec(claims).map_err(|e| EncodeError::Signing(e.to_string()))?;
                es512::sign(&header, &payload, secret)
            }
            (None, other) => Err(EncodeError::IncompatibleAlgorithm {
                alg: algorithm.to_string(),
                kty: other.key_type().to_string(),
            }),
        }
    }

    async fn signing_key(&self) -> Result<Key, EncodeError> {
        let key = match self.store.as_rotator() {
            Some(rotator) => rotator.load_by_name(&self.key_name).await?,
            None => self.store.load_by_kid(&self.key_name).await?,
        };
        Ok(key)
    }
}

fn encoding_key(key: &PrivateKey) -> Result<EncodingKey, EncodeError> {
    let signing = |e: &dyn std::fmt::Display| EncodeError::Signing(e.to_string());
    let encoding_key = match key {
        PrivateKey::Rsa(k) => {
            let der = k.to_pkcs1_der().map_err(|e| signing(&e))?;
            EncodingKey::from_rsa_der(der.as_bytes())
        }
        PrivateKey::Ec(EcPrivateKey::P256(k)) => {
            let der = k.to_pkcs8_der().map_err(|e| signing(&e))?;
            EncodingKey::from_ec_der(der.as_bytes())
        }
        PrivateKey::Ec(EcPrivateKey::P384(k)) => {
            let der = k.to_pkcs8_der().map_err(|e| signing(&e))?;
            EncodingKey::from_ec_der(der.as_bytes())
        }
        PrivateKey::Ed25519(k) => {
            let der = k.to_pkcs8_der().map_err(|e| signing(&e))?;
            EncodingKey::from_ed_der(der.as_bytes())
        }
        PrivateKey::Secret(secret) => EncodingKey::from_secret(secret),
        other => {
            return Err(EncodeError::Signing(format!(
                "no signer for {} key",
                other.key_type()
            )))
        }
    };
    Ok(encoding_key)
}
