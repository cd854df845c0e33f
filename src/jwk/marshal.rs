// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWK / JWKS wire codec (RFC 7517, RFC 7518 §6, RFC 8037 §2).
//!
//! Only public material is ever written. Byte fields use unpadded base64url.
//! Decoding reads `kid` and `kty` first, then the family-specific members;
//! every malformed input surfaces as [`KeyError`], never as a panic.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::{EcCurve, EcPublicKey, Key, KeyError, PublicKey};

/// JWK as written on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct JwkWire {
    kid: String,
    kty: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    crv: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    k: Option<String>,
}

impl JwkWire {
    fn new(kid: &str, kty: &'static str) -> Self {
        Self {
            kid: kid.to_string(),
            kty,
            crv: None,
            n: None,
            e: None,
            x: None,
            y: None,
            k: None,
        }
    }
}

/// Members common to every JWK, decoded first.
#[derive(Deserialize)]
struct JwkHead {
    #[serde(default)]
    kid: String,
    kty: String,
}

#[derive(Deserialize)]
struct RsaMembers {
    n: String,
    e: String,
}

#[derive(Deserialize)]
struct EcMembers {
    crv: String,
    x: String,
    y: String,
}

#[derive(Deserialize)]
struct OctMembers {
    k: String,
}

#[derive(Deserialize)]
struct OkpMembers {
    crv: String,
    x: String,
}

/// Serialize the public half of `key` as a JWK JSON object.
pub fn marshal_key(key: &Key) -> Result<String, KeyError> {
    let wire = to_wire(key)?;
    serde_json::to_string(&wire).map_err(|e| KeyError::MalformedJwk(e.to_string()))
}

/// Parse a JWK JSON object.
///
/// The resulting key is verification-only and its `name` equals its `kid`.
pub fn unmarshal_key(json: &str) -> Result<Key, KeyError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| KeyError::MalformedJwk(e.to_string()))?;
    from_value(value)
}

fn to_wire(key: &Key) -> Result<JwkWire, KeyError> {
    let wire = match key.public() {
        PublicKey::Rsa(pk) => {
            let mut wire = JwkWire::new(key.kid(), "RSA");
            wire.n = Some(b64(&pk.n().to_bytes_be()));
            wire.e = Some(b64(trim_leading_zeros(&pk.e().to_bytes_be())));
            wire
        }
        PublicKey::Ec(pk) => {
            let curve = pk.curve();
            let (x, y) = ec_coordinates(pk)?;
            let mut wire = JwkWire::new(key.kid(), "EC");
            wire.crv = Some(curve.jwk_name());
            wire.x = Some(b64(&x));
            wire.y = Some(b64(&y));
            wire
        }
        PublicKey::Ed25519(pk) => {
            let mut wire = JwkWire::new(key.kid(), "OKP");
            wire.crv = Some("Ed25519");
            wire.x = Some(b64(pk.as_bytes()));
            wire
        }
        PublicKey::Secret(secret) => {
            let mut wire = JwkWire::new(key.kid(), "oct");
            wire.k = Some(b64(secret));
            wire
        }
        PublicKey::Custom(pk) => {
            return Err(KeyError::UnsupportedKeyType(pk.key_type().to_string()));
        }
    };
    Ok(wire)
}

fn from_value(value: Value) -> Result<Key, KeyError> {
    let head: JwkHead = members(&value)?;
    let public = match head.kty.as_str() {
        "RSA" => {
            let m: RsaMembers = members(&value)?;
            let n = BigUint::from_bytes_be(&unb64("n", &m.n)?);
            let e = BigUint::from_bytes_be(&unb64("e", &m.e)?);
            let pk = RsaPublicKey::new(n, e)
                .map_err(|e| KeyError::MalformedJwk(format!("invalid RSA key: {e}")))?;
            PublicKey::Rsa(pk)
        }
        "EC" => {
            let m: EcMembers = members(&value)?;
            let curve = EcCurve::from_jwk_name(&m.crv)
                .ok_or_else(|| KeyError::UnsupportedCurve(m.crv.clone()))?;
            let x = unb64("x", &m.x)?;
            let y = unb64("y", &m.y)?;
            PublicKey::Ec(ec_from_coordinates(curve, &x, &y)?)
        }
        "OKP" => {
            let m: OkpMembers = members(&value)?;
            if m.crv != "Ed25519" {
                return Err(KeyError::UnsupportedCurve(m.crv));
            }
            let x = unb64("x", &m.x)?;
            let bytes: [u8; 32] = x.as_slice().try_into().map_err(|_| {
                KeyError::MalformedJwk(format!("Ed25519 key must be 32 bytes, got {}", x.len()))
            })?;
            let pk = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                .map_err(|e| KeyError::MalformedJwk(format!("invalid Ed25519 key: {e}")))?;
            PublicKey::Ed25519(pk)
        }
        "oct" => {
            let m: OctMembers = members(&value)?;
            PublicKey::Secret(unb64("k", &m.k)?)
        }
        other => return Err(KeyError::UnsupportedKeyType(other.to_string())),
    };
    Ok(Key::new(head.kid.clone(), head.kid, public))
}

fn members<T: DeserializeOwned>(value: &Value) -> Result<T, KeyError> {
    T::deserialize(value).map_err(|e| KeyError::MalformedJwk(e.to_string()))
}

/// Affine coordinates of an EC point, fixed width.
pub(crate) fn ec_coordinates(pk: &EcPublicKey) -> Result<(Vec<u8>, Vec<u8>), KeyError> {
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    macro_rules! coords {
        ($pk:expr) => {{
            let point = $pk.to_encoded_point(false);
            match (point.x(), point.y()) {
                (Some(x), Some(y)) => Ok((x.to_vec(), y.to_vec())),
                _ => Err(KeyError::MalformedJwk("EC point at infinity".to_string())),
            }
        }};
    }

    match pk {
        EcPublicKey::P256(k) => coords!(k),
        EcPublicKey::P384(k) => coords!(k),
        EcPublicKey::P521(k) => coords!(k),
    }
}

fn ec_from_coordinates(curve: EcCurve, x: &[u8], y: &[u8]) -> Result<EcPublicKey, KeyError> {
    let size = curve.coordinate_len();
    if x.len() > size || y.len() > size {
        return Err(KeyError::MalformedJwk(format!(
            "{} coordinate longer than {size} bytes",
            curve.jwk_name()
        )));
    }

    // Uncompressed SEC1 point, coordinates left-padded to the field size.
    let mut sec1 = Vec::with_capacity(1 + 2 * size);
    sec1.push(0x04);
    sec1.resize(1 + size - x.len(), 0);
    sec1.extend_from_slice(x);
    sec1.resize(1 + 2 * size - y.len(), 0);
    sec1.extend_from_slice(y);

    let invalid = |_| KeyError::MalformedJwk(format!("invalid {} point", curve.jwk_name()));
    let pk = match curve {
        EcCurve::P256 => EcPublicKey::P256(p256::PublicKey::from_sec1_bytes(&sec1).map_err(invalid)?),
        EcCurve::P384 => EcPublicKey::P384(p384::PublicKey::from_sec1_bytes(&sec1).map_err(invalid)?),
        EcCurve::P521 => EcPublicKey::P521(p521::PublicKey::from_sec1_bytes(&sec1).map_err(invalid)?),
    };
    Ok(pk)
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len().saturating_sub(1));
    &bytes[start..]
}

fn b64(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

fn unb64(member: &str, value: &str) -> Result<Vec<u8>, KeyError> {
    Base64UrlUnpadded::decode_vec(value)
        .map_err(|e| KeyError::MalformedJwk(format!("member \"{member}\": {e}")))
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_wire(self).map_err(ser::Error::custom)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        from_value(value).map_err(de::Error::custom)
    }
}

/// JSON Web Key Set, `{"keys": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Key>,
}

impl JwkSet {
    /// Build a publishable set; private halves are dropped.
    pub fn from_keys<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Self {
        Self {
            keys: keys.into_iter().map(Key::public_only).collect(),
        }
    }

    /// Look up a key by `kid`.
    pub fn find(&self, kid: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.kid() == kid)
    }

    pub fn to_json(&self) -> Result<String, KeyError> {
        let keys = self.keys.iter().map(to_wire).collect::<Result<Vec<_>, _>>()?;
        serde_json::to_string(&serde_json::json!({ "keys": keys }))
            .map_err(|e| KeyError::MalformedJwk(e.to_string()))
    }

    /// Parse a JWKS document. One bad entry fails the whole set.
    pub fn parse(json: &str) -> Result<Self, KeyError> {
        #[derive(Deserialize)]
        struct RawSet {
            keys: Vec<Value>,
        }

        let raw: RawSet =
            serde_json::from_str(json).map_err(|e| KeyError::MalformedJwk(e.to_string()))?;
        let keys = raw
            .keys
            .into_iter()
            .map(from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys })
    }
}
