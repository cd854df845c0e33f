// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PEM block decoding for key files.
//!
//! ## Supported blocks
//!
//! | Label | Content |
//! |-------|---------|
//! | `PRIVATE KEY` | PKCS#8 RSA, EC (P-256/384/521) or Ed25519 |
//! | `ENCRYPTED PRIVATE KEY` | password protected PKCS#8 (PBES2) |
//! | `RSA PRIVATE KEY` | PKCS#1 |
//! | `EC PRIVATE KEY` | SEC1 |
//! | `PUBLIC KEY` | SPKI RSA, EC or Ed25519 |
//! | `RSA PUBLIC KEY` | PKCS#1 |
//! | `CERTIFICATE` | X.509, public key extracted |
//! | `HMAC KEY` | raw symmetric secret |
//!
//! Legacy OpenSSL encryption (`Proc-Type: 4,ENCRYPTED` headers) is rejected;
//! re-encode such keys as `ENCRYPTED PRIVATE KEY`.

use pkcs8::{DecodePrivateKey, DecodePublicKey, EncryptedPrivateKeyInfo};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use tracing::warn;

use super::StoreError;
use crate::jwk::{EcPrivateKey, EcPublicKey, PrivateKey, PublicKey};

/// Key material decoded from one PEM block.
#[derive(Debug)]
pub(crate) enum PemKey {
    Private(PrivateKey),
    Public(PublicKey),
}

/// Decode every block of a PEM document.
///
/// A block that cannot be decoded fails the whole document.
pub(crate) fn parse_pem_keys(data: &[u8], password: Option<&str>) -> Result<Vec<PemKey>, StoreError> {
    let blocks = pem::parse_many(data).map_err(|e| StoreError::KeyFile(e.to_string()))?;
    blocks
        .iter()
        .enumerate()
        .map(|(index, block)| {
            parse_block(block, password).map_err(|e| match e {
                StoreError::KeyFile(msg) => {
                    StoreError::KeyFile(format!("block {index} ({}): {msg}", block.tag()))
                }
                other => other,
            })
        })
        .collect()
}

fn parse_block(block: &pem::Pem, password: Option<&str>) -> Result<PemKey, StoreError> {
    let der = block.contents();
    match block.tag() {
        "PRIVATE KEY" => pkcs8_private_key(der).map(PemKey::Private),
        "ENCRYPTED PRIVATE KEY" => {
            let password = password
                .ok_or_else(|| StoreError::KeyFile("password required".to_string()))?;
            let info = EncryptedPrivateKeyInfo::try_from(der).map_err(key_file_error)?;
            let document = info.decrypt(password).map_err(key_file_error)?;
            pkcs8_private_key(document.as_bytes()).map(PemKey::Private)
        }
        "RSA PRIVATE KEY" => {
            if block.headers().get("Proc-Type").is_some() {
                return Err(StoreError::KeyFile(
                    "legacy encrypted PEM is not supported, use PKCS#8".to_string(),
                ));
            }
            let key = rsa::RsaPrivateKey::from_pkcs1_der(der).map_err(key_file_error)?;
            Ok(PemKey::Private(PrivateKey::Rsa(key)))
        }
        "EC PRIVATE KEY" => {
            if block.headers().get("Proc-Type").is_some() {
                return Err(StoreError::KeyFile(
                    "legacy encrypted PEM is not supported, use PKCS#8".to_string(),
                ));
            }
            sec1_private_key(der).map(PemKey::Private)
        }
        "PUBLIC KEY" => spki_public_key(der).map(PemKey::Public),
        "RSA PUBLIC KEY" => {
            let key = rsa::RsaPublicKey::from_pkcs1_der(der).map_err(key_file_error)?;
            Ok(PemKey::Public(PublicKey::Rsa(key)))
        }
        "CERTIFICATE" => {
            let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(key_file_error)?;
            spki_public_key(cert.public_key().raw).map(PemKey::Public)
        }
        "HMAC KEY" => {
            warn!("HMAC key loaded from PEM, the secret is both signing and verification key");
            if der.is_empty() {
                return Err(StoreError::KeyFile("empty HMAC key".to_string()));
            }
            Ok(PemKey::Private(PrivateKey::Secret(der.to_vec())))
        }
        other => Err(StoreError::KeyFile(format!("unsupported PEM block type [{other}]"))),
    }
}

fn pkcs8_private_key(der: &[u8]) -> Result<PrivateKey, StoreError> {
    if let Ok(key) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(PrivateKey::Rsa(key));
    }
    if let Ok(key) = p256::SecretKey::from_pkcs8_der(der) {
        return Ok(PrivateKey::Ec(EcPrivateKey::P256(key)));
    }
    if let Ok(key) = p384::SecretKey::from_pkcs8_der(der) {
        return Ok(PrivateKey::Ec(EcPrivateKey::P384(key)));
    }
    if let Ok(key) = p521::SecretKey::from_pkcs8_der(der) {
        return Ok(PrivateKey::Ec(EcPrivateKey::P521(key)));
    }
    if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_der(der) {
        return Ok(PrivateKey::Ed25519(key));
    }
    Err(StoreError::KeyFile(
        "unsupported PKCS#8 private key algorithm".to_string(),
    ))
}

fn sec1_private_key(der: &[u8]) -> Result<PrivateKey, StoreError> {
    if let Ok(key) = p256::SecretKey::from_sec1_der(der) {
        return Ok(PrivateKey::Ec(EcPrivateKey::P256(key)));
    }
    if let Ok(key) = p384::SecretKey::from_sec1_der(der) {
        return Ok(PrivateKey::Ec(EcPrivateKey::P384(key)));
    }
    if let Ok(key) = p521::SecretKey::from_sec1_der(der) {
        return Ok(PrivateKey::Ec(EcPrivateKey::P521(key)));
    }
    Err(StoreError::KeyFile("unsupported EC curve".to_string()))
}

fn spki_public_key(der: &[u8]) -> Result<PublicKey, StoreError> {
    if let Ok(key) = rsa::RsaPublicKey::from_public_key_der(der) {
        return Ok(PublicKey::Rsa(key));
    }
    if let Ok(key) = p256::PublicKey::from_public_key_der(der) {
        return Ok(PublicKey::Ec(EcPublicKey::P256(key)));
    }
    if let Ok(key) = p384::PublicKey::from_public_key_der(der) {
        return Ok(PublicKey::Ec(EcPublicKey::P384(key)));
    }
    if let Ok(key) = p521::PublicKey::from_public_key_der(der) {
        return Ok(PublicKey::Ec(EcPublicKey::P521(key)));
    }
    if let Ok(key) = ed25519_dalek::VerifyingKey::from_public_key_der(der) {
        return Ok(PublicKey::Ed25519(key));
    }
    Err(StoreError::KeyFile(
        "unsupported public key algorithm".to_string(),
    ))
}

fn key_file_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::KeyFile(e.to_string())
}
