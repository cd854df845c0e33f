// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing algorithm selection.
//!
//! Maps key material to the JWA algorithm used when signing with it, and
//! generates fresh keys suitable for a requested algorithm.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::{EcCurve, EcPrivateKey, KeyError, PrivateKey, PublicKey};

/// RSA modulus size used for generated keys.
const GENERATED_RSA_BITS: usize = 2048;

/// JWS signing algorithms (RFC 7518 §3, RFC 8037 §3.1).
///
/// `none` is deliberately absent; unsigned tokens go through
/// [`crate::token::PlaintextJwtDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
    ES512,
    EdDSA,
}

impl SigningAlgorithm {
    /// Every supported algorithm, the default decoder allow-list.
    pub const ALL: [SigningAlgorithm; 13] = [
        SigningAlgorithm::HS256,
        SigningAlgorithm::HS384,
        SigningAlgorithm::HS512,
        SigningAlgorithm::RS256,
        SigningAlgorithm::RS384,
        SigningAlgorithm::RS512,
        SigningAlgorithm::PS256,
        SigningAlgorithm::PS384,
        SigningAlgorithm::PS512,
        SigningAlgorithm::ES256,
        SigningAlgorithm::ES384,
        SigningAlgorithm::ES512,
        SigningAlgorithm::EdDSA,
    ];

    /// JWA name as it appears in the `alg` header.
    pub fn as_str(self) -> &'static str {
        match self {
            SigningAlgorithm::HS256 => "HS256",
            SigningAlgorithm::HS384 => "HS384",
            SigningAlgorithm::HS512 => "HS512",
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::RS384 => "RS384",
            SigningAlgorithm::RS512 => "RS512",
            SigningAlgorithm::PS256 => "PS256",
            SigningAlgorithm::PS384 => "PS384",
            SigningAlgorithm::PS512 => "PS512",
            SigningAlgorithm::ES256 => "ES256",
            SigningAlgorithm::ES384 => "ES384",
            SigningAlgorithm::ES512 => "ES512",
            SigningAlgorithm::EdDSA => "EdDSA",
        }
    }

    /// Matching `jsonwebtoken` algorithm.
    ///
    /// `None` for ES512, which `jsonwebtoken` does not implement; the token
    /// codec signs and verifies it with `p521` directly.
    pub(crate) fn to_jsonwebtoken(self) -> Option<jsonwebtoken::Algorithm> {
        use jsonwebtoken::Algorithm;
        Some(match self {
            SigningAlgorithm::HS256 => Algorithm::HS256,
            SigningAlgorithm::HS384 => Algorithm::HS384,
            SigningAlgorithm::HS512 => Algorithm::HS512,
            SigningAlgorithm::RS256 => Algorithm::RS256,
            SigningAlgorithm::RS384 => Algorithm::RS384,
            SigningAlgorithm::RS512 => Algorithm::RS512,
            SigningAlgorithm::PS256 => Algorithm::PS256,
            SigningAlgorithm::PS384 => Algorithm::PS384,
            SigningAlgorithm::PS512 => Algorithm::PS512,
            SigningAlgorithm::ES256 => Algorithm::ES256,
            SigningAlgorithm::ES384 => Algorithm::ES384,
            SigningAlgorithm::ES512 => return None,
            SigningAlgorithm::EdDSA => Algorithm::EdDSA,
        })
    }

    /// Whether a key with this public material can verify (and, given the
    /// private half, produce) signatures of this algorithm.
    pub fn is_compatible_with(self, key: &PublicKey) -> bool {
        match (self, key) {
            (
                SigningAlgorithm::HS256 | SigningAlgorithm::HS384 | SigningAlgorithm::HS512,
                PublicKey::Secret(_),
            ) => true,
            (
                SigningAlgorithm::RS256
                | SigningAlgorithm::RS384
                | SigningAlgorithm::RS512
                | SigningAlgorithm::PS256
                | SigningAlgorithm::PS384
                | SigningAlgorithm::PS512,
                PublicKey::Rsa(_),
            ) => true,
            (SigningAlgorithm::ES256, PublicKey::Ec(k)) => k.curve() == EcCurve::P256,
            (SigningAlgorithm::ES384, PublicKey::Ec(k)) => k.curve() == EcCurve::P384,
            (SigningAlgorithm::ES512, PublicKey::Ec(k)) => k.curve() == EcCurve::P521,
            (SigningAlgorithm::EdDSA, PublicKey::Ed25519(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SigningAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| KeyError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Pick the signing algorithm for a private key.
///
/// - RSA: RS256
/// - EC: ES512 / ES384 / ES256 by curve size
/// - Ed25519: EdDSA
/// - secret: HS512 / HS384 / HS256 for at least 64 / 48 / 32 bytes
///
/// Shorter secrets and custom keys are rejected.
pub fn resolve_signing_algorithm(key: &PrivateKey) -> Result<SigningAlgorithm, KeyError> {
    match key {
        PrivateKey::Rsa(_) => Ok(SigningAlgorithm::RS256),
        PrivateKey::Ec(k) => {
            let bits = k.curve().bits();
            if bits >= 521 {
                Ok(SigningAlgorithm::ES512)
            } else if bits >= 384 {
                Ok(SigningAlgorithm::ES384)
            } else if bits >= 256 {
                Ok(SigningAlgorithm::ES256)
            } else {
                Err(KeyError::UnsupportedCurve(k.curve().jwk_name().to_string()))
            }
        }
        PrivateKey::Ed25519(_) => Ok(SigningAlgorithm::EdDSA),
        PrivateKey::Secret(secret) => match secret.len() {
            n if n >= 64 => Ok(SigningAlgorithm::HS512),
            n if n >= 48 => Ok(SigningAlgorithm::HS384),
            n if n >= 32 => Ok(SigningAlgorithm::HS256),
            n => Err(KeyError::KeyTooSmall(format!(
                "HMAC secret of {n} bytes, at least 32 required"
            ))),
        },
        PrivateKey::Custom(k) => Err(KeyError::UnsupportedKeyType(k.key_type().to_string())),
    }
}

/// Generate a fresh private key for `alg` from the OS CSPRNG.
pub fn generate_compatible_key(alg: SigningAlgorithm) -> Result<PrivateKey, KeyError> {
    generate_compatible_key_with(alg, &mut OsRng)
}

/// Generate a private key for `alg` from the given generator.
///
/// A seeded generator yields the same key every time.
pub fn generate_compatible_key_with<R>(
    alg: SigningAlgorithm,
    rng: &mut R,
) -> Result<PrivateKey, KeyError>
where
    R: CryptoRng + RngCore,
{
    let key = match alg {
        SigningAlgorithm::RS256
        | SigningAlgorithm::RS384
        | SigningAlgorithm::RS512
        | SigningAlgorithm::PS256
        | SigningAlgorithm::PS384
        | SigningAlgorithm::PS512 => {
            let key = rsa::RsaPrivateKey::new(rng, GENERATED_RSA_BITS)
                .map_err(|e| KeyError::Generation(e.to_string()))?;
            PrivateKey::Rsa(key)
        }
        SigningAlgorithm::ES256 => PrivateKey::Ec(EcPrivateKey::P256(p256::SecretKey::random(rng))),
        SigningAlgorithm::ES384 => PrivateKey::Ec(EcPrivateKey::P384(p384::SecretKey::random(rng))),
        SigningAlgorithm::ES512 => PrivateKey::Ec(EcPrivateKey::P521(p521::SecretKey::random(rng))),
        SigningAlgorithm::EdDSA => {
            PrivateKey::Ed25519(ed25519_dalek::SigningKey::generate(rng))
        }
        SigningAlgorithm::HS256 => PrivateKey::Secret(random_secret(rng, 32)),
        SigningAlgorithm::HS384 => PrivateKey::Secret(random_secret(rng, 48)),
        SigningAlgorithm::HS512 => PrivateKey::Secret(random_secret(rng, 64)),
    };
    Ok(key)
}

fn random_secret<R: RngCore>(rng: &mut R, len: usize) -> Vec<u8> {
    let mut secret = vec![0u8; len];
    rng.fill_bytes(&mut secret);
    secret
}
