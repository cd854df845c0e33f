// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT encoding and decoding on top of [`KeyStore`](crate::store::KeyStore)s.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use relational_jwt::store::StaticKeyStore;
//! use relational_jwt::token::{Claims, JwtDecoder, JwtEncoder};
//!
//! let store = Arc::new(StaticKeyStore::default());
//! let encoder = JwtEncoder::new(store.clone(), "kid1");
//! let decoder = JwtDecoder::new(store, "kid1");
//!
//! let mut claims = Claims::new();
//! claims.insert("sub".into(), "user-1".into());
//! let token = encoder.encode(&claims).await?;
//! let decoded: Claims = decoder.decode(&token).await?;
//! assert_eq!(decoded["sub"], "user-1");
//! # Ok(())
//! # }
//! ```

mod decoder;
mod encoder;
mod error;
mod es512;
mod header;

pub use decoder::{JwtDecoder, PlaintextJwtDecoder};
pub use encoder::JwtEncoder;
pub use error::{EncodeError, ValidationError};
pub use header::{parse_header, TokenHeader};

/// Free-form claims object.
pub type Claims = serde_json::Map<String, serde_json::Value>;
