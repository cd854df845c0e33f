// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token codec errors.

use crate::jwk::KeyError;
use crate::store::StoreError;

/// Errors raised while signing a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Signing key unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Key [{0}] has no private key")]
    MissingPrivateKey(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Algorithm {alg} cannot be used with {kty} key")]
    IncompatibleAlgorithm { alg: String, kty: String },

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Every reason a token is rejected.
///
/// Callers that only care whether a token is valid can treat all variants
/// alike; the detail is for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Unknown verification key: {0}")]
    UnknownKey(String),

    #[error("Algorithm [{0}] is not allowed")]
    DisallowedAlgorithm(String),

    #[error("Algorithm {alg} does not match {kty} key")]
    KeyMismatch { alg: String, kty: String },

    #[error("Unusable verification key: {0}")]
    Key(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token claims: {0}")]
    Claims(String),
}

impl From<jsonwebtoken::errors::Error> for ValidationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => ValidationError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                ValidationError::DisallowedAlgorithm(err.to_string())
            }
            ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::MissingAlgorithm => ValidationError::Key(err.to_string()),
            ErrorKind::Json(e) => ValidationError::Claims(e.to_string()),
            _ => ValidationError::Malformed(err.to_string()),
        }
    }
}
