// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing key model.
//!
//! A [`Key`] couples an identity (`kid` and rotation group `name`) with public
//! key material and, for keys this service signs with, the matching private
//! material. Keys are immutable: rotation replaces a key, it never edits one.
//!
//! ## Supported material
//!
//! | Family | Public | Private |
//! |--------|--------|---------|
//! | RSA | `rsa::RsaPublicKey` | `rsa::RsaPrivateKey` |
//! | EC | P-256 / P-384 / P-521 points | matching scalars |
//! | OKP | Ed25519 verifying key | Ed25519 signing key |
//! | oct | raw secret bytes | same bytes |
//! | custom | [`CustomPublicKey`] | [`CustomPrivateKey`] |

pub mod algorithm;
mod error;
pub mod marshal;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use algorithm::{
    generate_compatible_key, generate_compatible_key_with, resolve_signing_algorithm,
    SigningAlgorithm,
};
pub use error::KeyError;
pub use marshal::{marshal_key, unmarshal_key, JwkSet};

/// Caller-supplied public key type.
///
/// The codec cannot sign or serialize these; they only take part in lookups
/// and equality checks.
pub trait CustomPublicKey: fmt::Debug + Send + Sync {
    /// Short type label used in logs and errors.
    fn key_type(&self) -> &str;

    /// Whether `other` holds the same public material.
    fn equals(&self, other: &dyn CustomPublicKey) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Caller-supplied private key type.
pub trait CustomPrivateKey: fmt::Debug + Send + Sync {
    fn key_type(&self) -> &str;

    /// Public half of this key.
    fn public_key(&self) -> Arc<dyn CustomPublicKey>;
}

/// NIST curves accepted for EC keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    /// Curve size in bits.
    pub fn bits(self) -> usize {
        match self {
            EcCurve::P256 => 256,
            EcCurve::P384 => 384,
            EcCurve::P521 => 521,
        }
    }

    /// Length in bytes of one affine coordinate.
    pub fn coordinate_len(self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
            EcCurve::P521 => 66,
        }
    }

    /// `crv` value used in JWKs.
    pub fn jwk_name(self) -> &'static str {
        match self {
            EcCurve::P256 => "P-256",
            EcCurve::P384 => "P-384",
            EcCurve::P521 => "P-521",
        }
    }

    pub fn from_jwk_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(EcCurve::P256),
            "P-384" => Some(EcCurve::P384),
            "P-521" => Some(EcCurve::P521),
            _ => None,
        }
    }
}

/// EC public point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcPublicKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
    P521(p521::PublicKey),
}

impl EcPublicKey {
    pub fn curve(&self) -> EcCurve {
        match self {
            EcPublicKey::P256(_) => EcCurve::P256,
            EcPublicKey::P384(_) => EcCurve::P384,
            EcPublicKey::P521(_) => EcCurve::P521,
        }
    }
}

/// EC private scalar.
#[derive(Clone)]
pub enum EcPrivateKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    P521(p521::SecretKey),
}

impl EcPrivateKey {
    pub fn curve(&self) -> EcCurve {
        match self {
            EcPrivateKey::P256(_) => EcCurve::P256,
            EcPrivateKey::P384(_) => EcCurve::P384,
            EcPrivateKey::P521(_) => EcCurve::P521,
        }
    }

    pub fn public_key(&self) -> EcPublicKey {
        match self {
            EcPrivateKey::P256(k) => EcPublicKey::P256(k.public_key()),
            EcPrivateKey::P384(k) => EcPublicKey::P384(k.public_key()),
            EcPrivateKey::P521(k) => EcPublicKey::P521(k.public_key()),
        }
    }
}

/// Public key material.
#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(rsa::RsaPublicKey),
    Ec(EcPublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
    /// Symmetric secret. The public and private halves are the same bytes.
    Secret(Vec<u8>),
    Custom(Arc<dyn CustomPublicKey>),
}

impl PublicKey {
    /// JWK `kty` for built-in families, the custom label otherwise.
    pub fn key_type(&self) -> &str {
        match self {
            PublicKey::Rsa(_) => "RSA",
            PublicKey::Ec(_) => "EC",
            PublicKey::Ed25519(_) => "OKP",
            PublicKey::Secret(_) => "oct",
            PublicKey::Custom(k) => k.key_type(),
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PublicKey::Rsa(a), PublicKey::Rsa(b)) => a == b,
            (PublicKey::Ec(a), PublicKey::Ec(b)) => a == b,
            (PublicKey::Ed25519(a), PublicKey::Ed25519(b)) => a == b,
            (PublicKey::Secret(a), PublicKey::Secret(b)) => a == b,
            (PublicKey::Custom(a), PublicKey::Custom(b)) => a.equals(b.as_ref()),
            _ => false,
        }
    }
}

/// Private key material.
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(rsa::RsaPrivateKey),
    Ec(EcPrivateKey),
    Ed25519(ed25519_dalek::SigningKey),
    Secret(Vec<u8>),
    Custom(Arc<dyn CustomPrivateKey>),
}

impl PrivateKey {
    /// Derive the public half.
    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Rsa(k) => PublicKey::Rsa(k.to_public_key()),
            PrivateKey::Ec(k) => PublicKey::Ec(k.public_key()),
            PrivateKey::Ed25519(k) => PublicKey::Ed25519(k.verifying_key()),
            PrivateKey::Secret(k) => PublicKey::Secret(k.clone()),
            PrivateKey::Custom(k) => PublicKey::Custom(k.public_key()),
        }
    }

    pub fn key_type(&self) -> &str {
        match self {
            PrivateKey::Rsa(_) => "RSA",
            PrivateKey::Ec(_) => "EC",
            PrivateKey::Ed25519(_) => "OKP",
            PrivateKey::Secret(_) => "oct",
            PrivateKey::Custom(k) => k.key_type(),
        }
    }
}

// Never print private material.
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKey::Ec(k) => write!(f, "PrivateKey(EC {})", k.curve().jwk_name()),
            other => write!(f, "PrivateKey({})", other.key_type()),
        }
    }
}

struct KeyInner {
    kid: String,
    name: String,
    public: PublicKey,
    private: Option<PrivateKey>,
}

/// A signing or verification key with its identity.
///
/// Cloning is cheap; the material is shared.
#[derive(Clone)]
pub struct Key {
    inner: Arc<KeyInner>,
}

impl Key {
    /// Create a verification-only key.
    pub fn new(kid: impl Into<String>, name: impl Into<String>, public: PublicKey) -> Self {
        Self {
            inner: Arc::new(KeyInner {
                kid: kid.into(),
                name: name.into(),
                public,
                private: None,
            }),
        }
    }

    /// Create a signing key. The public half is derived from `private`.
    pub fn with_private(
        kid: impl Into<String>,
        name: impl Into<String>,
        private: PrivateKey,
    ) -> Self {
        Self {
            inner: Arc::new(KeyInner {
                kid: kid.into(),
                name: name.into(),
                public: private.public_key(),
                private: Some(private),
            }),
        }
    }

    pub fn kid(&self) -> &str {
        &self.inner.kid
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn public(&self) -> &PublicKey {
        &self.inner.public
    }

    pub fn private(&self) -> Option<&PrivateKey> {
        self.inner.private.as_ref()
    }

    /// Same identity and public material, private half dropped.
    pub fn public_only(&self) -> Self {
        if self.inner.private.is_none() {
            return self.clone();
        }
        Self::new(self.kid(), self.name(), self.public().clone())
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.kid() == other.kid() && self.name() == other.name() && self.public() == other.public()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("kid", &self.inner.kid)
            .field("name", &self.inner.name)
            .field("kty", &self.inner.public.key_type())
            .field("private", &self.inner.private.is_some())
            .finish()
    }
}
