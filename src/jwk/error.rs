// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key material errors.

/// Errors raised while building, converting or (de)serializing keys.
///
/// Every variant carries a human readable detail so failures can be cached
/// and handed to several waiters, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Key too small: {0}")]
    KeyTooSmall(String),

    #[error("Malformed JWK: {0}")]
    MalformedJwk(String),

    #[error("Key generation failed: {0}")]
    Generation(String),
}
