// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ES512 (ECDSA P-521 / SHA-512) signing and verification.
//!
//! `jsonwebtoken` has no P-521 support, so these tokens are assembled and
//! checked here with `p521`. Signatures are the fixed-width `r || s`
//! encoding from RFC 7518 §3.4.

use p521::ecdsa::signature::{Signer, Verifier};
use p521::ecdsa::{Signature, SigningKey, VerifyingKey};
use p521::elliptic_curve::sec1::ToEncodedPoint;

use super::header::{b64_decode, b64_encode, TokenParts};
use super::{EncodeError, ValidationError};

/// Produce a compact JWS from already serialized header and claims.
pub(crate) fn sign(
    header_json: &[u8],
    claims_json: &[u8],
    key: &p521::SecretKey,
) -> Result<String, EncodeError> {
    let signing_key = SigningKey::from_bytes(&key.to_bytes())
        .map_err(|e| EncodeError::Signing(e.to_string()))?;
    let signing_input = format!("{}.{}", b64_encode(header_json), b64_encode(claims_json));
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    Ok(format!("{signing_input}.{}", b64_encode(&signature.to_bytes())))
}

/// Check the signature of `parts` against `key`.
pub(crate) fn verify(parts: &TokenParts<'_>, key: &p521::PublicKey) -> Result<(), ValidationError> {
    let verifying_key = VerifyingKey::from_sec1_bytes(key.to_encoded_point(false).as_bytes())
        .map_err(|e| ValidationError::Key(e.to_string()))?;
    let signature_bytes = b64_decode(parts.signature)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| ValidationError::InvalidSignature)?;
    verifying_key
        .verify(parts.signing_input().as_bytes(), &signature)
        .map_err(|_| ValidationError::InvalidSignature)
}
