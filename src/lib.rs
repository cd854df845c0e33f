// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational JWT - signing keys and token codec for the authorization server.
//!
//! ## Modules
//!
//! - `jwk` - Key model, JWK/JWKS wire format, algorithm selection
//! - `store` - File, static, single and remote key stores
//! - `cache` - Single-flight TTL cache used by the remote store
//! - `token` - JWT encoder and decoder
//! - `config` - Environment variables and key configuration
//! - `logging` - Tracing subscriber setup

pub mod cache;
pub mod config;
pub mod jwk;
pub mod logging;
pub mod store;
pub mod token;
