// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PEM-backed key store against real `openssl` output.

use std::collections::BTreeMap;
use std::path::PathBuf;

use relational_jwt::config::KeyFileProperties;
use relational_jwt::jwk::{EcCurve, JwkSet, PublicKey};
use relational_jwt::store::{FileKeyStore, KeyStore};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn entry(file: &str, id: Option<&str>, password: Option<&str>) -> KeyFileProperties {
    KeyFileProperties {
        id: id.map(str::to_string),
        format: "pem".to_string(),
        file: fixture(file),
        password: password.map(str::to_string),
    }
}

fn store(entries: &[(&str, KeyFileProperties)]) -> FileKeyStore {
    let files: BTreeMap<String, KeyFileProperties> = entries
        .iter()
        .map(|(name, props)| (name.to_string(), props.clone()))
        .collect();
    FileKeyStore::new(&files)
}

#[tokio::test]
async fn multi_key_file_rotates_round_robin() {
    let store = store(&[("k", entry("rsa-3-keys.pem", Some("k"), None))]);

    let kids: Vec<String> = store
        .load_all(&[])
        .await
        .unwrap()
        .iter()
        .map(|k| k.kid().to_string())
        .collect();
    assert_eq!(kids, ["k-0", "k-1", "k-2"]);

    let rotator = store.as_rotator().expect("file store rotates");
    let mut seen = vec![store.load_by_name("k").await.unwrap().kid().to_string()];
    for _ in 0..3 {
        rotator.rotate("k").await.unwrap();
        seen.push(store.load_by_name("k").await.unwrap().kid().to_string());
    }
    assert_eq!(seen, ["k-0", "k-1", "k-2", "k-0"]);
}

#[tokio::test]
async fn every_pem_flavour_loads() {
    let store = store(&[
        ("pkcs1", entry("rsa-pkcs1.pem", None, None)),
        ("public", entry("rsa-public.pem", None, None)),
        ("sec1", entry("ec-p521-sec1.pem", None, None)),
        ("ed", entry("ed25519.pem", None, None)),
        ("encrypted", entry("p256-encrypted.pem", None, Some("changeit"))),
        ("cert", entry("p384-cert.pem", None, None)),
    ]);

    let mut names: Vec<&str> = store.names().collect();
    names.sort_unstable();
    assert_eq!(names, ["cert", "ed", "encrypted", "pkcs1", "public", "sec1"]);

    let key = store.load_by_name("pkcs1").await.unwrap();
    assert!(key.private().is_some());
    assert!(matches!(key.public(), PublicKey::Rsa(_)));

    let key = store.load_by_name("public").await.unwrap();
    assert!(key.private().is_none());
    // The public file holds the public half of the PKCS#1 key.
    assert_eq!(
        key.public(),
        store.load_by_name("pkcs1").await.unwrap().public()
    );

    let key = store.load_by_name("sec1").await.unwrap();
    assert!(matches!(key.public(), PublicKey::Ec(ec) if ec.curve() == EcCurve::P521));

    let key = store.load_by_name("ed").await.unwrap();
    assert!(matches!(key.public(), PublicKey::Ed25519(_)));

    let key = store.load_by_name("encrypted").await.unwrap();
    assert!(key.private().is_some());
    assert!(matches!(key.public(), PublicKey::Ec(ec) if ec.curve() == EcCurve::P256));

    let key = store.load_by_name("cert").await.unwrap();
    assert!(key.private().is_none());
    assert!(matches!(key.public(), PublicKey::Ec(ec) if ec.curve() == EcCurve::P384));
}

#[tokio::test]
async fn digest_kids_are_stable_and_prefixed() {
    let first = store(&[("signing", entry("ed25519.pem", None, None))]);
    let second = store(&[("signing", entry("ed25519.pem", None, None))]);

    let kid = first.load_by_name("signing").await.unwrap().kid().to_string();
    let digest = kid.strip_prefix("signing-").expect("name prefix");
    // SHA-224, hex encoded.
    assert_eq!(digest.len(), 56);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(second.load_by_name("signing").await.unwrap().kid(), kid);
    assert_eq!(first.load_by_kid(&kid).await.unwrap().name(), "signing");
}

#[tokio::test]
async fn broken_entries_are_skipped() {
    let store = store(&[
        ("good", entry("ed25519.pem", Some("good"), None)),
        ("empty", entry("empty.pem", None, None)),
        ("mixed", entry("mixed.pem", None, None)),
        ("wrong-password", entry("p256-encrypted.pem", None, Some("nope"))),
        ("no-password", entry("p256-encrypted.pem", None, None)),
        ("legacy-rsa", entry("rsa-legacy-encrypted.pem", None, Some("changeit"))),
        ("legacy-ec", entry("ec-legacy-encrypted.pem", None, Some("changeit"))),
        ("missing", entry("does-not-exist.pem", None, None)),
        (
            "jks",
            KeyFileProperties {
                format: "jks".to_string(),
                ..entry("ed25519.pem", None, None)
            },
        ),
    ]);

    assert_eq!(store.names().collect::<Vec<_>>(), ["good"]);
    assert!(store.load_by_name("empty").await.unwrap_err().is_not_found());
    assert!(store.load_by_name("legacy-rsa").await.unwrap_err().is_not_found());
    assert!(store.load_by_kid("good-0").await.is_ok());
}

#[tokio::test]
async fn duplicate_kids_keep_the_first_entry() {
    let store = store(&[
        ("a", entry("ed25519.pem", Some("same"), None)),
        ("b", entry("rsa-pkcs1.pem", Some("same"), None)),
    ]);

    let key = store.load_by_kid("same-0").await.unwrap();
    assert_eq!(key.name(), "a");
    assert_eq!(store.names().collect::<Vec<_>>(), ["a"]);
}

#[tokio::test]
async fn published_set_never_contains_private_members() {
    let store = store(&[
        ("rsa", entry("rsa-pkcs1.pem", Some("rsa"), None)),
        ("ed", entry("ed25519.pem", Some("ed"), None)),
    ]);
    let keys = store.load_all(&["rsa"]).await.unwrap();
    assert_eq!(keys.len(), 1);

    let all = store.load_all(&[]).await.unwrap();
    let json = JwkSet::from_keys(&all).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    for jwk in value["keys"].as_array().unwrap() {
        for member in ["d", "p", "q", "dp", "dq", "qi"] {
            assert!(jwk.get(member).is_none(), "{member} leaked in {jwk}");
        }
    }
    assert_eq!(JwkSet::parse(&json).unwrap().keys.len(), 2);
}
