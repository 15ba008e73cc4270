//! Media cache keyed by canonical URL.
//!
//! Every URL is in exactly one of three states: absent, in flight, or
//! present. Transitions between them happen under a single lock so that
//! concurrent callers (foreground play and background preload) never start a
//! second retrieval for a URL that is already being fetched. Retrievals run on
//! their own task and always complete, even if every caller stops waiting.

mod fetch;

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use lru::LruCache;
use tokio::sync::watch;

use crate::{config::CacheConfig, Result, StorybookError};

pub use fetch::{FileFetcher, HttpFetcher, SourceFetcher};

/// Retrieves the raw bytes behind a canonical URL.
pub trait MediaFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Cheaply clonable reference to a cached media buffer.
///
/// Clones share one allocation. The cache holds one reference per entry; a
/// playing resource holds another, so evicting an entry never pulls the
/// buffer out from under active playback.
#[derive(Clone)]
pub struct MediaHandle {
    inner: Arc<MediaBuffer>,
}

struct MediaBuffer {
    source_url: String,
    bytes: Vec<u8>,
}

impl MediaHandle {
    pub fn new(source_url: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(MediaBuffer {
                source_url: source_url.into(),
                bytes,
            }),
        }
    }

    pub fn source_url(&self) -> &str {
        &self.inner.source_url
    }

    pub fn bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// Whether both handles point at the same cached buffer.
    pub fn same_buffer(&self, other: &MediaHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live references to the underlying buffer.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("source_url", &self.inner.source_url)
            .field("bytes", &self.inner.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub source_url: String,
    pub handle: MediaHandle,
    pub loaded_at_latency_ms: f64,
}

/// Emitted once per successful retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchEvent {
    pub url: String,
    pub latency_ms: f64,
    pub bytes: usize,
}

/// Passive subscriber to cache retrievals.
pub trait FetchObserver: Send + Sync {
    fn fetch_completed(&self, event: &FetchEvent);
}

type Settled = Option<Result<MediaHandle>>;

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    in_flight: HashMap<String, watch::Receiver<Settled>>,
}

struct Shared<F> {
    fetcher: F,
    fetch_timeout: Duration,
    state: Mutex<CacheState>,
    observers: Mutex<Vec<Arc<dyn FetchObserver>>>,
}

/// Deduplicating, size-bounded media cache.
pub struct CacheStore<F> {
    shared: Arc<Shared<F>>,
}

impl<F> Clone for CacheStore<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<F: MediaFetcher> CacheStore<F> {
    pub fn new(fetcher: F, config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            shared: Arc::new(Shared {
                fetcher,
                fetch_timeout: config.fetch_timeout(),
                state: Mutex::new(CacheState {
                    entries: LruCache::new(capacity),
                    in_flight: HashMap::new(),
                }),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.shared.fetcher
    }

    /// Registers an observer for completed retrievals.
    pub fn subscribe(&self, observer: Arc<dyn FetchObserver>) {
        if let Ok(mut observers) = self.shared.observers.lock() {
            observers.push(observer);
        }
    }

    /// Returns the cached handle for `url`, retrieving it if necessary.
    ///
    /// Callers arriving while a retrieval for the same URL is running wait
    /// on that retrieval instead of starting another.
    pub async fn ensure(&self, url: &str) -> Result<MediaHandle> {
        let mut settled = {
            let mut state = self.shared.lock_state()?;
            if let Some(handle) = state.entries.get(url).map(|entry| entry.handle.clone()) {
                tracing::debug!(url, "cache hit");
                return Ok(handle);
            }

            let pending = state.in_flight.get(url).cloned();
            match pending {
                Some(pending) => {
                    tracing::debug!(url, "joining in-flight retrieval");
                    pending
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    state.in_flight.insert(url.to_string(), rx.clone());
                    self.spawn_retrieval(url.to_string(), tx);
                    rx
                }
            }
        };

        let outcome = match settled.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(StorybookError::cache_fetch(
                url,
                "retrieval ended without a result",
            ))
        })
    }

    /// Synchronous membership check. Does not touch LRU order.
    pub fn has(&self, url: &str) -> bool {
        self.shared
            .lock_state()
            .map(|state| state.entries.contains(url))
            .unwrap_or(false)
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.shared
            .lock_state()
            .map(|state| state.in_flight.contains_key(url))
            .unwrap_or(false)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.shared
            .lock_state()
            .map(|state| state.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entry for `url` without promoting it.
    pub fn entry(&self, url: &str) -> Option<CacheEntry> {
        let state = self.shared.lock_state().ok()?;
        state.entries.peek(url).cloned()
    }

    /// Inserts bytes obtained elsewhere. No retrieval, no fetch event.
    pub fn seed(&self, url: &str, bytes: Vec<u8>) -> Result<MediaHandle> {
        let handle = MediaHandle::new(url, bytes);
        let mut state = self.shared.lock_state()?;
        state.insert(CacheEntry {
            source_url: url.to_string(),
            handle: handle.clone(),
            loaded_at_latency_ms: 0.0,
        });
        Ok(handle)
    }

    /// Drops the cache's reference to `url`. Returns whether it was cached.
    pub fn release(&self, url: &str) -> bool {
        match self.shared.lock_state() {
            Ok(mut state) => state.entries.pop(url).is_some(),
            Err(_) => false,
        }
    }

    /// Drops every cached entry. Running retrievals are unaffected.
    pub fn clear(&self) {
        if let Ok(mut state) = self.shared.lock_state() {
            state.entries.clear();
        }
    }

    fn spawn_retrieval(&self, url: String, tx: watch::Sender<Settled>) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut guard = InFlightGuard {
                shared: &shared,
                url: &url,
                armed: true,
            };

            let started = Instant::now();
            let fetched = match tokio::time::timeout(
                shared.fetch_timeout,
                shared.fetcher.fetch(&url),
            )
            .await
            {
                Ok(Ok(bytes)) => Ok(bytes),
                Ok(Err(err @ StorybookError::CacheFetch { .. })) => Err(err),
                Ok(Err(err)) => Err(StorybookError::cache_fetch(url.as_str(), err)),
                Err(_) => Err(StorybookError::cache_fetch(
                    url.as_str(),
                    format!("timed out after {:?}", shared.fetch_timeout),
                )),
            };
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            let outcome = fetched.map(|bytes| MediaHandle::new(url.as_str(), bytes));
            guard.armed = false;
            shared.settle(&url, &outcome, latency_ms);
            tx.send_replace(Some(outcome));
        });
    }
}

impl<F> Shared<F> {
    fn lock_state(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| StorybookError::msg("media cache has been poisoned"))
    }

    fn settle(&self, url: &str, outcome: &Result<MediaHandle>, latency_ms: f64) {
        {
            let Ok(mut state) = self.lock_state() else {
                return;
            };
            state.in_flight.remove(url);
            if let Ok(handle) = outcome {
                state.insert(CacheEntry {
                    source_url: url.to_string(),
                    handle: handle.clone(),
                    loaded_at_latency_ms: latency_ms,
                });
            }
        }

        match outcome {
            Ok(handle) => {
                tracing::info!(url, latency_ms, bytes = handle.len(), "cached media");
                let event = FetchEvent {
                    url: url.to_string(),
                    latency_ms,
                    bytes: handle.len(),
                };
                let observers = self
                    .observers
                    .lock()
                    .map(|observers| observers.clone())
                    .unwrap_or_default();
                for observer in observers {
                    observer.fetch_completed(&event);
                }
            }
            Err(err) => tracing::warn!(url, %err, "media retrieval failed"),
        }
    }
}

impl CacheState {
    fn insert(&mut self, entry: CacheEntry) {
        let url = entry.source_url.clone();
        if let Some((evicted, old)) = self.entries.push(url.clone(), entry) {
            if evicted != url {
                tracing::debug!(url = %evicted, holders = old.handle.holders(), "evicted cached media");
            }
        }
    }
}

/// Clears the in-flight slot if the retrieval task unwinds before settling,
/// so later callers can retry instead of waiting on a dead entry.
struct InFlightGuard<'a, F> {
    shared: &'a Shared<F>,
    url: &'a str,
    armed: bool,
}

impl<F> Drop for InFlightGuard<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut state) = self.shared.state.lock() {
                state.in_flight.remove(self.url);
            }
        }
    }
}
