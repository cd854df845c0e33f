// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key store backed by a remote JWKS endpoint.
//!
//! Only public keys are ever served, so this store verifies tokens issued
//! elsewhere and never signs.
//!
//! ## Lookup
//!
//! - With a per-kid endpoint configured, `load_by_kid` fetches `{base}/{kid}`.
//! - Otherwise it fetches the whole set and picks the matching kid.
//!
//! ## Caching
//!
//! Fetches go through a [`MemCache`]: successful responses are kept for `ttl`,
//! failures for `retry_backoff` so a broken endpoint is not hammered. The
//! cache sweeps expired entries every `ttl`.
//!
//! Kid lookups are cached under the kid, `load_all` under a separate entry.
//! A kid absent from the fetched set counts as a failure, so a key the issuer
//! publishes after rotation is picked up once `retry_backoff` has passed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Request};
use tracing::debug;
use url::Url;

use super::{name_selected, KeyStore, StoreError};
use crate::cache::{CacheOptions, Loaded, MemCache};
use crate::config::{
    RemoteJwksProperties, DEFAULT_JWKS_CACHE_TTL, DEFAULT_JWKS_RETRY, DEFAULT_JWKS_RETRY_BACKOFF,
    DEFAULT_JWKS_URL,
};
use crate::jwk::{unmarshal_key, JwkSet, Key};

/// Cache key of the whole key set.
const JWK_SET_CACHE_KEY: &str = "__jwk_set__";

/// HTTP client timeout used when none is supplied.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the request for the whole key set.
pub type JwkSetRequestFactory = Arc<dyn Fn(&Client) -> reqwest::Result<Request> + Send + Sync>;

/// Builds the request for a single kid.
pub type JwkRequestFactory = Arc<dyn Fn(&Client, &str) -> reqwest::Result<Request> + Send + Sync>;

/// Remote store settings.
#[derive(Clone)]
pub struct RemoteKeyStoreConfig {
    pub jwk_set_url: String,
    /// Base of the per-kid endpoint. When unset, kids are looked up in the set.
    pub jwk_base_url: Option<String>,
    /// Overrides the default `GET jwk_set_url`.
    pub jwk_set_request: Option<JwkSetRequestFactory>,
    /// Overrides the default `GET {jwk_base_url}/{kid}`.
    pub jwk_request: Option<JwkRequestFactory>,
    pub client: Option<Client>,
    pub cache_enabled: bool,
    pub ttl: Duration,
    pub retry: usize,
    pub retry_backoff: Duration,
}

impl Default for RemoteKeyStoreConfig {
    fn default() -> Self {
        Self {
            jwk_set_url: DEFAULT_JWKS_URL.to_string(),
            jwk_base_url: None,
            jwk_set_request: None,
            jwk_request: None,
            client: None,
            cache_enabled: true,
            ttl: DEFAULT_JWKS_CACHE_TTL,
            retry: DEFAULT_JWKS_RETRY,
            retry_backoff: DEFAULT_JWKS_RETRY_BACKOFF,
        }
    }
}

impl From<&RemoteJwksProperties> for RemoteKeyStoreConfig {
    fn from(props: &RemoteJwksProperties) -> Self {
        Self {
            jwk_set_url: props.jwk_set_url.clone(),
            jwk_base_url: props.jwk_base_url.clone(),
            cache_enabled: props.cache_enabled,
            ttl: props.ttl(),
            retry: props.retry,
            retry_backoff: props.retry_backoff(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for RemoteKeyStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteKeyStoreConfig")
            .field("jwk_set_url", &self.jwk_set_url)
            .field("jwk_base_url", &self.jwk_base_url)
            .field("custom_set_request", &self.jwk_set_request.is_some())
            .field("custom_jwk_request", &self.jwk_request.is_some())
            .field("cache_enabled", &self.cache_enabled)
            .field("ttl", &self.ttl)
            .field("retry", &self.retry)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

#[derive(Clone)]
enum Fetched {
    Key(Key),
    Set(Arc<Vec<Key>>),
}

/// Performs the HTTP calls. Cloned into cache loaders.
#[derive(Clone)]
struct Fetcher {
    client: Client,
    jwk_set_url: Url,
    jwk_base_url: Option<Url>,
    jwk_set_request: Option<JwkSetRequestFactory>,
    jwk_request: Option<JwkRequestFactory>,
}

impl Fetcher {
    fn per_kid(&self) -> bool {
        self.jwk_request.is_some() || self.jwk_base_url.is_some()
    }

    async fn fetch_set(&self) -> Result<Vec<Key>, StoreError> {
        let request = match &self.jwk_set_request {
            Some(factory) => factory(&self.client),
            None => self.client.get(self.jwk_set_url.clone()).build(),
        }
        .map_err(|e| StoreError::Request(e.to_string()))?;

        let body = self.execute(request).await?;
        let set = JwkSet::parse(&body).map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(set.keys)
    }

    async fn fetch_key(&self, kid: &str) -> Result<Key, StoreError> {
        let request = match (&self.jwk_request, &self.jwk_base_url) {
            (Some(factory), _) => factory(&self.client, kid),
            (None, Some(base)) => {
                let url = kid_url(base, kid)?;
                self.client.get(url).build()
            }
            (None, None) => return Err(StoreError::Request("no per-kid endpoint".to_string())),
        }
        .map_err(|e| StoreError::Request(e.to_string()))?;

        let body = self.execute(request).await?;
        unmarshal_key(&body).map_err(|e| StoreError::Parse(e.to_string()))
    }

    /// Key for `kid`, from the per-kid endpoint when there is one.
    async fn find_key(&self, kid: &str) -> Result<Key, StoreError> {
        if self.per_kid() {
            return self.fetch_key(kid).await;
        }
        self.fetch_set()
            .await?
            .into_iter()
            .find(|k| k.kid() == kid)
            .ok_or_else(|| StoreError::KidNotFound(kid.to_string()))
    }

    async fn execute(&self, request: Request) -> Result<String, StoreError> {
        debug!(url = %request.url(), "Fetching JWKS");
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }
}

fn kid_url(base: &Url, kid: &str) -> Result<Url, StoreError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StoreError::Request(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .push(kid);
    Ok(url)
}

/// [`KeyStore`] fetching public keys from a JWKS endpoint.
pub struct RemoteKeyStore {
    fetcher: Fetcher,
    cache: Option<MemCache<String, Fetched, StoreError>>,
    ttl: Duration,
    retry_backoff: Duration,
}

impl RemoteKeyStore {
    /// Create a store. Fails on unparsable URLs or when the HTTP client
    /// cannot be built.
    ///
    /// With caching enabled this must run inside a tokio runtime so the
    /// eviction task can start.
    pub fn new(config: RemoteKeyStoreConfig) -> Result<Self, StoreError> {
        let jwk_set_url = Url::parse(&config.jwk_set_url)
            .map_err(|e| StoreError::Request(format!("{}: {e}", config.jwk_set_url)))?;
        let jwk_base_url = config
            .jwk_base_url
            .as_deref()
            .map(|base| Url::parse(base).map_err(|e| StoreError::Request(format!("{base}: {e}"))))
            .transpose()?;
        let client = match config.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .map_err(|e| StoreError::Request(e.to_string()))?,
        };

        let cache = config.cache_enabled.then(|| {
            MemCache::new(CacheOptions {
                heartbeat: config.ttl,
                load_retry: config.retry,
            })
        });

        Ok(Self {
            fetcher: Fetcher {
                client,
                jwk_set_url,
                jwk_base_url,
                jwk_set_request: config.jwk_set_request,
                jwk_request: config.jwk_request,
            },
            cache,
            ttl: config.ttl,
            retry_backoff: config.retry_backoff,
        })
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.reset();
        }
    }

    async fn key_set(&self) -> Result<Arc<Vec<Key>>, StoreError> {
        let Some(cache) = &self.cache else {
            return self.fetcher.fetch_set().await.map(Arc::new);
        };

        let (ttl, backoff) = (self.ttl, self.retry_backoff);
        let fetcher = self.fetcher.clone();
        let loader = move |_key: String| {
            let fetcher = fetcher.clone();
            async move {
                match fetcher.fetch_set().await {
                    Ok(keys) => Loaded::value(Fetched::Set(Arc::new(keys))).expires_in(ttl),
                    Err(e) => Loaded::error(e).expires_in(backoff),
                }
            }
        };
        match cache.get_or_load(JWK_SET_CACHE_KEY.to_string(), loader, None).await? {
            Fetched::Set(keys) => Ok(keys),
            Fetched::Key(_) => Err(StoreError::Cache("unexpected entry for key set".to_string())),
        }
    }

    async fn single_key(&self, kid: &str) -> Result<Key, StoreError> {
        let Some(cache) = &self.cache else {
            return self.fetcher.find_key(kid).await;
        };

        let (ttl, backoff) = (self.ttl, self.retry_backoff);
        let fetcher = self.fetcher.clone();
        let loader = move |kid: String| {
            let fetcher = fetcher.clone();
            async move {
                match fetcher.find_key(&kid).await {
                    Ok(key) => Loaded::value(Fetched::Key(key)).expires_in(ttl),
                    Err(e) => Loaded::error(e).expires_in(backoff),
                }
            }
        };
        match cache.get_or_load(kid.to_string(), loader, None).await? {
            Fetched::Key(key) => Ok(key),
            Fetched::Set(_) => Err(StoreError::Cache("unexpected entry for key".to_string())),
        }
    }
}

#[async_trait]
impl KeyStore for RemoteKeyStore {
    async fn load_by_kid(&self, kid: &str) -> Result<Key, StoreError> {
        self.single_key(kid).await
    }

    /// Remote keys are not grouped; the name is a kid.
    async fn load_by_name(&self, name: &str) -> Result<Key, StoreError> {
        self.load_by_kid(name).await
    }

    async fn load_all(&self, names: &[&str]) -> Result<Vec<Key>, StoreError> {
        Ok(self
            .key_set()
            .await?
            .iter()
            .filter(|k| name_selected(names, k.name()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kid_url_appends_segment() {
        let base = Url::parse("https://auth.example.com/jwks/").unwrap();
        assert_eq!(
            kid_url(&base, "abc").unwrap().as_str(),
            "https://auth.example.com/jwks/abc"
        );
        let base = Url::parse("https://auth.example.com/jwks").unwrap();
        assert_eq!(
            kid_url(&base, "a/b").unwrap().as_str(),
            "https://auth.example.com/jwks/a%2Fb"
        );
    }

    #[test]
    fn rejects_bad_urls() {
        let config = RemoteKeyStoreConfig {
            jwk_set_url: "not a url".into(),
            cache_enabled: false,
            ..RemoteKeyStoreConfig::default()
        };
        assert!(matches!(RemoteKeyStore::new(config), Err(StoreError::Request(_))));
    }

    #[test]
    fn config_from_properties() {
        let props = RemoteJwksProperties {
            retry: 5,
            ttl_secs: 10,
            ..RemoteJwksProperties::default()
        };
        let config = RemoteKeyStoreConfig::from(&props);
        assert_eq!(config.retry, 5);
        assert_eq!(config.ttl, Duration::from_secs(10));
        assert_eq!(config.jwk_set_url, DEFAULT_JWKS_URL);
        assert!(format!("{config:?}").contains("custom_set_request: false"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let config = RemoteKeyStoreConfig {
            // Port 9 (discard) on loopback is closed on test machines.
            jwk_set_url: "http://127.0.0.1:9/jwks".into(),
            cache_enabled: false,
            ..RemoteKeyStoreConfig::default()
        };
        let store = RemoteKeyStore::new(config).unwrap();
        assert!(matches!(
            store.load_by_kid("any").await,
            Err(StoreError::Transport(_))
        ));
    }
}
