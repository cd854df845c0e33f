// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process TTL cache with single-flight loading.
//!
//! [`MemCache`] maps keys to entries produced by an async loader. At most one
//! load runs per key; concurrent callers for the same key wait on the entry's
//! completion latch and share its outcome. Loader errors are cached like
//! values (typically with a short expiry) so a failing backend is not hammered.
//!
//! ## Entry lifecycle
//!
//! 1. Created by the first miss, inserted under the write lock.
//! 2. Populated exactly once by a load running on its own tokio task.
//! 3. Invalidated when found expired, rejected by a validator or swept by
//!    [`MemCache::evict`]. The flag never flips back.
//! 4. Removed on the next structural change or by the eviction sweep.
//!
//! ## Background eviction
//!
//! With a non-zero `heartbeat`, construction spawns a reaper task that calls
//! [`MemCache::evict`] periodically. The reaper only holds a weak reference and
//! stops when the cache is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors returned by [`MemCache`] lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError<E> {
    /// The loader failed; the failure is cached until it expires.
    #[error("{0}")]
    Load(E),

    #[error("unable to load a valid entry after {0} attempts")]
    Exhausted(usize),

    #[error("cache loader panicked: {0}")]
    LoaderPanicked(String),
}

/// Outcome of a loader or updater run.
#[derive(Debug)]
pub struct Loaded<V, E> {
    result: Result<V, E>,
    expires_at: Option<Instant>,
}

impl<V, E> Loaded<V, E> {
    /// An outcome that never expires.
    pub fn new(result: Result<V, E>) -> Self {
        Self {
            result,
            expires_at: None,
        }
    }

    pub fn value(value: V) -> Self {
        Self::new(Ok(value))
    }

    pub fn error(error: E) -> Self {
        Self::new(Err(error))
    }

    /// Expire `ttl` from now.
    pub fn expires_in(self, ttl: Duration) -> Self {
        self.expires_at(Instant::now() + ttl)
    }

    pub fn expires_at(mut self, at: Instant) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// Predicate deciding whether a cached value may still be served.
pub type Validator<'a, V> = &'a (dyn Fn(&V) -> bool + Send + Sync);

/// Construction options.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Interval of the background eviction sweep. Zero disables it.
    pub heartbeat: Duration,
    /// Extra attempts `get_or_load` makes after an expired or rejected entry.
    pub load_retry: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            heartbeat: Duration::ZERO,
            load_retry: 1,
        }
    }
}

type Outcome<V, E> = (Result<V, CacheError<E>>, Option<Instant>);

struct Entry<V, E> {
    outcome: OnceLock<Outcome<V, E>>,
    loaded: AtomicBool,
    invalidated: AtomicBool,
    done: watch::Sender<bool>,
}

impl<V: Clone, E: Clone> Entry<V, E> {
    fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            outcome: OnceLock::new(),
            loaded: AtomicBool::new(false),
            invalidated: AtomicBool::new(false),
            done,
        }
    }

    fn complete(&self, outcome: Outcome<V, E>) {
        // A second completion cannot happen: each entry gets exactly one load.
        let _ = self.outcome.set(outcome);
        self.loaded.store(true, Ordering::Release);
        self.done.send_replace(true);
    }

    /// Wait for the load, returning its result and whether it has expired.
    async fn wait(&self) -> (Result<V, CacheError<E>>, bool) {
        let mut done = self.done.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = done.wait_for(|loaded| *loaded).await;
        match self.outcome.get() {
            Some((result, expires_at)) => (result.clone(), is_expired(*expires_at)),
            None => (
                Err(CacheError::LoaderPanicked("entry completed without outcome".to_string())),
                true,
            ),
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    fn is_expired(&self) -> bool {
        self.outcome
            .get()
            .is_some_and(|(_, expires_at)| is_expired(*expires_at))
    }
}

fn is_expired(expires_at: Option<Instant>) -> bool {
    expires_at.is_some_and(|at| at <= Instant::now())
}

type EntryMap<K, V, E> = HashMap<K, Arc<Entry<V, E>>>;

struct Shared<K, V, E> {
    entries: RwLock<EntryMap<K, V, E>>,
}

impl<K, V, E> Shared<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    fn evict(&self) -> usize {
        // Phase 1: flag loaded and expired entries. Loading entries are skipped.
        let mut flagged = 0;
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            for entry in entries.values() {
                if entry.is_loaded() && !entry.is_invalidated() && entry.is_expired() {
                    entry.invalidate();
                    flagged += 1;
                }
            }
        }
        if flagged == 0 {
            return 0;
        }

        // Phase 2: remove everything flagged.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_invalidated());
        before - entries.len()
    }
}

/// Concurrent TTL cache with single-flight loading.
pub struct MemCache<K, V, E> {
    shared: Arc<Shared<K, V, E>>,
    load_retry: usize,
    reaper: Option<CancellationToken>,
}

impl<K, V, E> MemCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a cache.
    ///
    /// The background reaper is only started when `heartbeat` is non-zero and
    /// a tokio runtime is available.
    pub fn new(options: CacheOptions) -> Self {
        let shared = Arc::new(Shared {
            entries: RwLock::new(HashMap::new()),
        });
        let reaper = if options.heartbeat.is_zero() {
            None
        } else {
            spawn_reaper(Arc::downgrade(&shared), options.heartbeat)
        };
        Self {
            shared,
            load_retry: options.load_retry,
            reaper,
        }
    }

    /// Return the cached value for `key`, loading it when missing, expired or
    /// rejected by `validator`.
    ///
    /// A value produced by this very call is returned without consulting the
    /// validator, and so is a cached loader error that has not expired.
    /// `None` as validator accepts every value.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: K,
        loader: F,
        validator: Option<Validator<'_, V>>,
    ) -> Result<V, CacheError<E>>
    where
        F: Fn(K) -> Fut,
        Fut: Future<Output = Loaded<V, E>> + Send + 'static,
    {
        for _ in 0..=self.load_retry {
            let (entry, is_new) = self.get_or_new(&key, &loader);
            let (result, expired) = entry.wait().await;
            if is_new {
                return result;
            }
            if !expired {
                match &result {
                    Err(_) => return result,
                    Ok(value) if validator.is_none_or(|accept| accept(value)) => return result,
                    Ok(_) => {}
                }
            }
            entry.invalidate();
        }
        Err(CacheError::Exhausted(self.load_retry + 1))
    }

    /// Replace the entry for `key` with the outcome of `updater`.
    ///
    /// Returns `Ok(false)` when `key` is not cached, including when it is
    /// deleted or replaced while the current load finishes. Otherwise runs
    /// `updater` with the previous value while readers block on the new entry,
    /// and returns the updater's error if it failed.
    pub async fn update<F, Fut>(&self, key: K, updater: F) -> Result<bool, CacheError<E>>
    where
        F: FnOnce(K, Option<V>) -> Fut,
        Fut: Future<Output = Loaded<V, E>> + Send + 'static,
    {
        let existing = {
            let entries = self.shared.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries.get(&key).filter(|e| !e.is_invalidated()).cloned()
        };
        let Some(existing) = existing else {
            return Ok(false);
        };

        let (previous, _) = existing.wait().await;
        let entry = Arc::new(Entry::new());
        {
            let mut entries = self.shared.entries.write().unwrap_or_else(PoisonError::into_inner);
            let still_cached = entries
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &existing) && !current.is_invalidated());
            if !still_cached {
                return Ok(false);
            }
            existing.invalidate();
            entries.insert(key.clone(), Arc::clone(&entry));
        }
        spawn_load(Arc::clone(&entry), updater(key, previous.ok()));

        let (result, _) = entry.wait().await;
        result.map(|_| true)
    }

    /// Drop the entry for `key`.
    pub fn delete(&self, key: &K) {
        let mut entries = self.shared.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    /// Drop every entry.
    pub fn reset(&self) {
        let mut entries = self.shared.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Remove loaded entries whose expiry has passed. Returns how many were
    /// removed.
    pub fn evict(&self) -> usize {
        self.shared.evict()
    }

    /// Number of stored entries, including invalidated ones not yet removed.
    pub fn len(&self) -> usize {
        self.shared
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_new<F, Fut>(&self, key: &K, loader: &F) -> (Arc<Entry<V, E>>, bool)
    where
        F: Fn(K) -> Fut,
        Fut: Future<Output = Loaded<V, E>> + Send + 'static,
    {
        {
            let entries = self.shared.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(key).filter(|e| !e.is_invalidated()) {
                return (Arc::clone(entry), false);
            }
        }

        let entry = {
            let mut entries = self.shared.entries.write().unwrap_or_else(PoisonError::into_inner);
            // Another caller may have inserted while we waited for the lock.
            if let Some(entry) = entries.get(key).filter(|e| !e.is_invalidated()) {
                return (Arc::clone(entry), false);
            }
            entries.retain(|_, e| !e.is_invalidated());
            let entry = Arc::new(Entry::new());
            entries.insert(key.clone(), Arc::clone(&entry));
            entry
        };
        spawn_load(Arc::clone(&entry), loader(key.clone()));
        (entry, true)
    }
}

impl<K, V, E> Drop for MemCache<K, V, E> {
    fn drop(&mut self) {
        if let Some(reaper) = &self.reaper {
            reaper.cancel();
        }
    }
}

/// Run a load on its own task so a dropped caller does not abandon it.
fn spawn_load<V, E, Fut>(entry: Arc<Entry<V, E>>, load: Fut)
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    Fut: Future<Output = Loaded<V, E>> + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = match tokio::spawn(load).await {
            Ok(loaded) => (loaded.result.map_err(CacheError::Load), loaded.expires_at),
            Err(e) => {
                warn!(error = %e, "Cache loader did not complete");
                // Expire immediately so the next lookup retries.
                (
                    Err(CacheError::LoaderPanicked(e.to_string())),
                    Some(Instant::now()),
                )
            }
        };
        entry.complete(outcome);
    });
}

fn spawn_reaper<K, V, E>(shared: Weak<Shared<K, V, E>>, heartbeat: Duration) -> Option<CancellationToken>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("No tokio runtime, cache eviction reaper disabled");
        return None;
    };

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = token.cancelled() => return,
            }
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let removed = shared.evict();
            if removed > 0 {
                debug!(removed, "Evicted expired cache entries");
            }
        }
    });
    Some(shutdown)
}
