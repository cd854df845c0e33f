// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token verification.
//!
//! ## Security
//!
//! - The algorithm allow-list never contains `none`
//! - The header algorithm must match the family (and curve) of the key the
//!   `kid` resolves to, so an RSA public key can never be replayed as an HMAC
//!   secret
//! - Claim semantics (`exp`, `nbf`, `aud`) are left to the caller

use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::{DecodingKey, Validation};
use rsa::traits::PublicKeyParts;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::header::{b64_decode, b64_encode, decode_header, split_token};
use super::{es512, ValidationError};
use crate::jwk::marshal::ec_coordinates;
use crate::jwk::{EcPublicKey, PublicKey, SigningAlgorithm};
use crate::store::KeyStore;

/// Verifies signed tokens against keys from a [`KeyStore`].
#[derive(Clone)]
pub struct JwtDecoder {
    store: Arc<dyn KeyStore>,
    default_kid: String,
    allowed: Vec<SigningAlgorithm>,
}

impl JwtDecoder {
    /// Tokens without a `kid` header are verified with `default_kid`.
    pub fn new(store: Arc<dyn KeyStore>, default_kid: impl Into<String>) -> Self {
        Self {
            store,
            default_kid: default_kid.into(),
            allowed: SigningAlgorithm::ALL.to_vec(),
        }
    }

    /// Restrict accepted algorithms.
    pub fn with_allowed_algorithms(
        mut self,
        algorithms: impl IntoIterator<Item = SigningAlgorithm>,
    ) -> Self {
        self.allowed = algorithms.into_iter().collect();
        self
    }

    /// Verify `token` and deserialize its claims.
    pub async fn decode<T>(&self, token: &str) -> Result<T, ValidationError>
    where
        T: DeserializeOwned + Clone,
    {
        let parts = split_token(token)?;
        let header = decode_header(parts.header)?;
        let algorithm: SigningAlgorithm = header
            .alg
            .parse()
            .map_err(|_| ValidationError::DisallowedAlgorithm(header.alg.clone()))?;
        if !self.allowed.contains(&algorithm) {
            return Err(ValidationError::DisallowedAlgorithm(header.alg));
        }

        let kid = header.kid.as_deref().unwrap_or(&self.default_kid);
        let key = self
            .store
            .load_by_kid(kid)
            .await
            .map_err(|e| ValidationError::UnknownKey(e.to_string()))?;
        if !algorithm.is_compatible_with(key.public()) {
            return Err(ValidationError::KeyMismatch {
                alg: algorithm.to_string(),
                kty: key.public().key_type().to_string(),
            });
        }
        debug!(kid = %key.kid(), alg = %algorithm, "Verifying token");

        match (algorithm.to_jsonwebtoken(), key.public()) {
            (Some(alg), public) => {
                let decoding_key = decoding_key(public)?;
                let mut validation = Validation::new(alg);
                validation.algorithms = vec![alg];
                validation.validate_exp = false;
                validation.validate_nbf = false;
                validation.validate_aud = false;
                validation.required_spec_claims = HashSet::new();
                let data = jsonwebtoken::decode::<T>(token, &decoding_key, &validation)?;
                Ok(data.claims)
            }
            (None, PublicKey::Ec(EcPublicKey::P521(public))) => {
                es512::verify(&parts, public)?;
                let payload = b64_decode(parts.payload)?;
                serde_json::from_slice(&payload).map_err(|e| ValidationError::Claims(e.to_string()))
            }
            (None, other) => Err(ValidationError::KeyMismatch {
                alg: algorithm.to_string(),
                kty: other.key_type().to_string(),
            }),
        }
    }
}

fn decoding_key(key: &PublicKey) -> Result<DecodingKey, ValidationError> {
    let key_error = |e: jsonwebtoken::errors::Error| ValidationError::Key(e.to_string());
    match key {
        PublicKey::Rsa(k) => Ok(DecodingKey::from_rsa_raw_components(
            &k.n().to_bytes_be(),
            &k.e().to_bytes_be(),
        )),
        PublicKey::Ec(k) => {
            let (x, y) = ec_coordinates(k).map_err(|e| ValidationError::Key(e.to_string()))?;
            DecodingKey::from_ec_components(&b64_encode(&x), &b64_encode(&y)).map_err(key_error)
        }
        PublicKey::Ed25519(k) => {
            DecodingKey::from_ed_components(&b64_encode(k.as_bytes())).map_err(key_error)
        }
        PublicKey::Secret(secret) => Ok(DecodingKey::from_secret(secret)),
        PublicKey::Custom(k) => Err(ValidationError::Key(format!(
            "unsupported key type {}",
            k.key_type()
        ))),
    }
}

/// Decoder for unsigned (`alg: none`) tokens.
///
/// Only for hops where the transport already authenticates the sender.
/// Signed tokens are rejected so the two decoders are never confused.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextJwtDecoder;

impl PlaintextJwtDecoder {
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, ValidationError> {
        let parts = split_token(token)?;
        let header = decode_header(parts.header)?;
        if header.alg != "none" {
            return Err(ValidationError::DisallowedAlgorithm(header.alg));
        }
        if !parts.signature.is_empty() {
            return Err(ValidationError::Malformed(
                "unsigned token carries a signature".to_string(),
            ));
        }
        let payload = b64_decode(parts.payload)?;
        serde_json::from_slice(&payload).map_err(|e| ValidationError::Claims(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Claims;
    use serde_json::json;

    fn unsigned(header: serde_json::Value, claims: serde_json::Value) -> String {
        format!(
            "{}.{}.",
            b64_encode(header.to_string().as_bytes()),
            b64_encode(claims.to_string().as_bytes())
        )
    }

    #[test]
    fn plaintext_decodes_none_tokens() {
        let token = unsigned(json!({"alg": "none"}), json!({"sub": "svc"}));
        let claims: Claims = PlaintextJwtDecoder.decode(&token).unwrap();
        assert_eq!(claims["sub"], "svc");
    }

    #[test]
    fn plaintext_rejects_signed_tokens() {
        let token = unsigned(json!({"alg": "HS256"}), json!({}));
        assert_eq!(
            PlaintextJwtDecoder.decode::<Claims>(&token),
            Err(ValidationError::DisallowedAlgorithm("HS256".into()))
        );

        let with_sig = format!("{}c2ln", unsigned(json!({"alg": "none"}), json!({})));
        assert!(matches!(
            PlaintextJwtDecoder.decode::<Claims>(&with_sig),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn signed_decoder_rejects_none() {
        let store = Arc::new(crate::store::SingleKeyStore::generate("k", SigningAlgorithm::HS256).unwrap());
        let decoder = JwtDecoder::new(store, "k");
        let token = unsigned(json!({"alg": "none"}), json!({"sub": "x"}));
        assert_eq!(
            decoder.decode::<Claims>(&token).await,
            Err(ValidationError::DisallowedAlgorithm("none".into()))
        );
    }
}
