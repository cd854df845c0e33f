// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compact serialization helpers.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::Serialize;
use serde_json::{Map, Value};

use super::ValidationError;

/// Unverified JOSE header of a token.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: Option<String>,
    pub kid: Option<String>,
    /// Every header member, including the ones above.
    pub raw: Map<String, Value>,
}

/// Header as written by the encoder.
#[derive(Debug, Serialize)]
pub(crate) struct HeaderMembers<'a> {
    pub typ: &'a str,
    pub alg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<&'a str>,
}

pub(crate) struct TokenParts<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
}

impl TokenParts<'_> {
    /// `header.payload`, the JWS signing input.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }
}

pub(crate) fn split_token(token: &str) -> Result<TokenParts<'_>, ValidationError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ValidationError::Malformed(
            "expected three dot-separated segments".to_string(),
        ));
    };
    Ok(TokenParts {
        header,
        payload,
        signature,
    })
}

/// Read the header of `token` without verifying anything.
pub fn parse_header(token: &str) -> Result<TokenHeader, ValidationError> {
    let parts = split_token(token)?;
    decode_header(parts.header)
}

pub(crate) fn decode_header(segment: &str) -> Result<TokenHeader, ValidationError> {
    let bytes = b64_decode(segment)?;
    let raw: Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|e| ValidationError::Malformed(format!("header: {e}")))?;
    let alg = raw
        .get("alg")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::Malformed("header without alg".to_string()))?
        .to_string();
    let member = |name: &str| raw.get(name).and_then(Value::as_str).map(str::to_string);
    Ok(TokenHeader {
        alg,
        typ: member("typ"),
        kid: member("kid"),
        raw,
    })
}

pub(crate) fn b64_encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

pub(crate) fn b64_decode(segment: &str) -> Result<Vec<u8>, ValidationError> {
    Base64UrlUnpadded::decode_vec(segment)
        .map_err(|e| ValidationError::Malformed(format!("base64url: {e}")))
}
