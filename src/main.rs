// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Prints the public JWKS document for the configured key files.
//!
//! Reads [`CryptoProperties`] from the JSON file named by `JWT_KEYS_CONFIG`
//! and writes `{"keys": [...]}` to stdout, ready to be served from a JWKS
//! endpoint. Private material never leaves the process.

use std::process::ExitCode;

use relational_jwt::config::CryptoProperties;
use relational_jwt::jwk::JwkSet;
use relational_jwt::logging::init_tracing;
use relational_jwt::store::{FileKeyStore, KeyStore};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let props = match CryptoProperties::from_env() {
        Ok(props) => props,
        Err(e) => {
            error!(error = %e, "Failed to load key configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = FileKeyStore::new(&props.keys);
    let keys = match store.load_all(&[]).await {
        Ok(keys) => keys,
        Err(e) => {
            error!(error = %e, "Failed to load keys");
            return ExitCode::FAILURE;
        }
    };
    info!(count = keys.len(), signing_key = %props.jwt.key_name, "Loaded keys");

    match JwkSet::from_keys(&keys).to_json() {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Failed to encode JWKS");
            ExitCode::FAILURE
        }
    }
}
