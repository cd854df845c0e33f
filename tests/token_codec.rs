// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token encode/decode across key families and stores.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use relational_jwt::config::KeyFileProperties;
use relational_jwt::jwk::SigningAlgorithm;
use relational_jwt::store::{FileKeyStore, KeyStore, SingleKeyStore, StaticKeyStore};
use relational_jwt::token::{
    parse_header, Claims, EncodeError, JwtDecoder, JwtEncoder, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    scope: Vec<String>,
    exp: u64,
}

fn claims() -> AccessClaims {
    AccessClaims {
        sub: "user-42".to_string(),
        scope: vec!["openid".to_string(), "profile".to_string()],
        // Already expired: expiry is the caller's concern.
        exp: 1,
    }
}

fn codec(store: Arc<dyn KeyStore>, name: &str) -> (JwtEncoder, JwtDecoder) {
    (
        JwtEncoder::new(store.clone(), name),
        JwtDecoder::new(store, name),
    )
}

fn replace_header(token: &str, header: serde_json::Value) -> String {
    let rest = token.split_once('.').map(|(_, rest)| rest).unwrap();
    format!("{}.{rest}", URL_SAFE_NO_PAD.encode(header.to_string()))
}

#[tokio::test]
async fn round_trips_with_the_resolved_algorithm() {
    for alg in [
        SigningAlgorithm::RS256,
        SigningAlgorithm::ES256,
        SigningAlgorithm::ES384,
        SigningAlgorithm::ES512,
        SigningAlgorithm::EdDSA,
        SigningAlgorithm::HS256,
        SigningAlgorithm::HS384,
        SigningAlgorithm::HS512,
    ] {
        let store = Arc::new(SingleKeyStore::generate("signing", alg).unwrap());
        let (encoder, decoder) = codec(store, "signing");

        let token = encoder.encode(&claims()).await.unwrap();
        let header = parse_header(&token).unwrap();
        assert_eq!(header.alg, alg.as_str());
        assert_eq!(header.kid, None, "{alg}");

        let decoded: AccessClaims = decoder.decode(&token).await.unwrap();
        assert_eq!(decoded, claims(), "{alg}");
    }
}

#[tokio::test]
async fn rsa_keys_sign_with_a_fixed_algorithm() {
    let store = Arc::new(SingleKeyStore::generate("rsa", SigningAlgorithm::RS256).unwrap());
    for alg in [
        SigningAlgorithm::RS384,
        SigningAlgorithm::RS512,
        SigningAlgorithm::PS256,
        SigningAlgorithm::PS384,
        SigningAlgorithm::PS512,
    ] {
        let encoder = JwtEncoder::new(store.clone(), "rsa").with_algorithm(alg);
        let decoder = JwtDecoder::new(store.clone(), "rsa");
        let token = encoder.encode(&claims()).await.unwrap();
        assert_eq!(parse_header(&token).unwrap().alg, alg.as_str());
        let decoded: AccessClaims = decoder.decode(&token).await.unwrap();
        assert_eq!(decoded.sub, "user-42", "{alg}");
    }
}

#[tokio::test]
async fn fixed_algorithm_must_fit_the_key() {
    let store = Arc::new(SingleKeyStore::generate("ec", SigningAlgorithm::ES256).unwrap());
    let encoder = JwtEncoder::new(store, "ec").with_algorithm(SigningAlgorithm::ES384);
    assert!(matches!(
        encoder.encode(&claims()).await,
        Err(EncodeError::IncompatibleAlgorithm { alg, .. }) if alg == "ES384"
    ));
}

#[tokio::test]
async fn unknown_signing_key() {
    let store = Arc::new(SingleKeyStore::generate("a", SigningAlgorithm::EdDSA).unwrap());
    let encoder = JwtEncoder::new(store, "b");
    assert!(matches!(
        encoder.encode(&claims()).await,
        Err(EncodeError::Store(e)) if e.is_not_found()
    ));
}

#[tokio::test]
async fn other_keys_cannot_verify() {
    let signer = Arc::new(SingleKeyStore::generate("k", SigningAlgorithm::ES256).unwrap());
    let impostor = Arc::new(SingleKeyStore::generate("k", SigningAlgorithm::ES256).unwrap());
    let token = JwtEncoder::new(signer, "k").encode(&claims()).await.unwrap();

    let decoder = JwtDecoder::new(impostor, "k");
    assert_eq!(
        decoder.decode::<Claims>(&token).await,
        Err(ValidationError::InvalidSignature)
    );
}

#[tokio::test]
async fn header_algorithm_must_match_the_key_family() {
    let hmac = Arc::new(SingleKeyStore::generate("k", SigningAlgorithm::HS256).unwrap());
    let rsa = Arc::new(SingleKeyStore::generate("k", SigningAlgorithm::RS256).unwrap());
    let token = JwtEncoder::new(hmac, "k").encode(&claims()).await.unwrap();

    let decoder = JwtDecoder::new(rsa, "k");
    assert!(matches!(
        decoder.decode::<Claims>(&token).await,
        Err(ValidationError::KeyMismatch { alg, .. }) if alg == "HS256"
    ));
}

#[tokio::test]
async fn allow_list_is_enforced() {
    let store = Arc::new(SingleKeyStore::generate("k", SigningAlgorithm::HS256).unwrap());
    let (encoder, decoder) = codec(store, "k");
    let decoder = decoder.with_allowed_algorithms([SigningAlgorithm::RS256, SigningAlgorithm::EdDSA]);

    let token = encoder.encode(&claims()).await.unwrap();
    assert_eq!(
        decoder.decode::<Claims>(&token).await,
        Err(ValidationError::DisallowedAlgorithm("HS256".into()))
    );
}

#[tokio::test]
async fn tampering_is_detected() {
    let store = Arc::new(SingleKeyStore::generate("k", SigningAlgorithm::EdDSA).unwrap());
    let (encoder, decoder) = codec(store, "k");
    let token = encoder.encode(&claims()).await.unwrap();

    let forged = URL_SAFE_NO_PAD.encode(json!({"sub": "admin", "scope": [], "exp": 1}).to_string());
    let mut parts: Vec<&str> = token.split('.').collect();
    parts[1] = &forged;
    assert_eq!(
        decoder.decode::<Claims>(&parts.join(".")).await,
        Err(ValidationError::InvalidSignature)
    );

    assert!(matches!(
        decoder.decode::<Claims>("not-a-token").await,
        Err(ValidationError::Malformed(_))
    ));
}

#[tokio::test]
async fn unknown_kid_is_rejected() {
    let store = Arc::new(SingleKeyStore::generate("k", SigningAlgorithm::HS256).unwrap());
    let (encoder, decoder) = codec(store, "k");
    let token = encoder.encode(&claims()).await.unwrap();

    let redirected = replace_header(&token, json!({"alg": "HS256", "kid": "elsewhere"}));
    assert!(matches!(
        decoder.decode::<Claims>(&redirected).await,
        Err(ValidationError::UnknownKey(_))
    ));
}

#[tokio::test]
async fn rotation_moves_the_header_kid() {
    let file = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/rsa-3-keys.pem");
    let files = BTreeMap::from([(
        "k".to_string(),
        KeyFileProperties {
            id: Some("k".to_string()),
            format: "pem".to_string(),
            file,
            password: None,
        },
    )]);
    let store = Arc::new(FileKeyStore::new(&files));
    let (encoder, decoder) = codec(store.clone(), "k");

    let first = encoder.encode(&claims()).await.unwrap();
    assert_eq!(parse_header(&first).unwrap().kid.as_deref(), Some("k-0"));

    store.as_rotator().unwrap().rotate("k").await.unwrap();
    let second = encoder.encode(&claims()).await.unwrap();
    assert_eq!(parse_header(&second).unwrap().kid.as_deref(), Some("k-1"));

    // Both remain verifiable: rotation only changes the signing key.
    decoder.decode::<AccessClaims>(&first).await.unwrap();
    decoder.decode::<AccessClaims>(&second).await.unwrap();

    let misattributed = replace_header(&second, json!({"alg": "RS256", "typ": "JWT", "kid": "k-0"}));
    assert_eq!(
        decoder.decode::<Claims>(&misattributed).await,
        Err(ValidationError::InvalidSignature)
    );
}

#[tokio::test]
async fn static_stores_agree_across_instances() {
    let issuer = Arc::new(StaticKeyStore::new(["seed-a", "seed-b"]).with_algorithm(SigningAlgorithm::ES256));
    let verifier = Arc::new(StaticKeyStore::new(["seed-a", "seed-b"]).with_algorithm(SigningAlgorithm::ES256));

    let encoder = JwtEncoder::new(issuer.clone(), "seed-a");
    let decoder = JwtDecoder::new(verifier, "seed-a");

    let token = encoder.encode(&claims()).await.unwrap();
    assert_eq!(parse_header(&token).unwrap().kid, None);
    decoder.decode::<AccessClaims>(&token).await.unwrap();

    issuer.as_rotator().unwrap().rotate("seed-a").await.unwrap();
    let token = encoder.encode(&claims()).await.unwrap();
    assert_eq!(parse_header(&token).unwrap().kid.as_deref(), Some("seed-b"));
    decoder.decode::<AccessClaims>(&token).await.unwrap();
}

#[tokio::test]
async fn default_static_stores_sign_rs256() {
    let issuer = Arc::new(StaticKeyStore::default());
    let verifier = Arc::new(StaticKeyStore::default());

    let token = JwtEncoder::new(issuer, "kid1").encode(&claims()).await.unwrap();
    assert_eq!(parse_header(&token).unwrap().alg, "RS256");
    let decoded: AccessClaims = JwtDecoder::new(verifier, "kid1").decode(&token).await.unwrap();
    assert_eq!(decoded, claims());
}
