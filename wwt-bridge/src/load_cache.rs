//! Idempotent URL-keyed load cache.
//!
//! Ensures a load keyed by URL is issued at most once, and that every caller
//! for that URL (before, during or after the load) receives the same value.
//!
//! ```text
//! request(url) ──► absent    ──► record InFlight, issue load ──┐
//!              ──► in flight ──► queue caller                  │
//!              ──► completed ──► resolve with cached Arc<V>    │
//!                                                              ▼
//!                  LoadCompletion::complete(Ok(v)) ──► Completed(Arc<v>)
//!                                                   └─► resolve queue
//! ```
//!
//! # Implementation
//!
//! Entries live in a `DashMap`, whose entry API makes check-then-register
//! atomic per URL. The load itself is issued after the map guard is
//! released because the engine may complete it synchronously.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::engine::EngineError;

/// Errors delivered to callers of [`LoadCache::request`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// The engine reported a failure for the load.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The load was dropped without ever completing.
    #[error("load of {url} was abandoned before completing")]
    Abandoned { url: String },

    /// The waiter was polled again after it had already yielded its outcome.
    #[error("load waiter for {url} polled after completion")]
    Consumed { url: String },
}

type LoadOutcome<V> = Result<Arc<V>, LoadError>;

enum Slot<V> {
    InFlight {
        waiters: Vec<oneshot::Sender<LoadOutcome<V>>>,
    },
    Completed(Arc<V>),
}

/// Observable state of one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Never requested, or the last load failed.
    Absent,
    /// Load issued and not yet complete.
    InFlight {
        /// Callers queued on the load.
        waiters: usize,
    },
    /// Load finished; the value is cached permanently.
    Completed,
}

/// Statistics for monitoring load deduplication.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadCacheStats {
    /// Total requests received.
    pub total_requests: u64,
    /// Requests that issued a real load.
    pub issued_loads: u64,
    /// Requests queued behind an in-flight load.
    pub coalesced_requests: u64,
    /// Requests answered from a completed entry.
    pub cache_hits: u64,
}

impl LoadCacheStats {
    /// Share of requests that did not issue a load (0.0 to 1.0).
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.coalesced_requests + self.cache_hits) as f64 / self.total_requests as f64
        }
    }
}

struct CacheInner<V> {
    name: &'static str,
    entries: DashMap<String, Slot<V>>,
    total_requests: AtomicU64,
    issued_loads: AtomicU64,
    coalesced_requests: AtomicU64,
    cache_hits: AtomicU64,
}

/// Deduplicating cache of loads keyed by URL.
///
/// URLs are compared as plain strings. Clones share the same entries.
pub struct LoadCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for LoadCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> LoadCache<V> {
    /// Create an empty cache. `name` only appears in log output.
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                name,
                entries: DashMap::new(),
                total_requests: AtomicU64::new(0),
                issued_loads: AtomicU64::new(0),
                coalesced_requests: AtomicU64::new(0),
                cache_hits: AtomicU64::new(0),
            }),
        }
    }

    /// Request the value for `url`.
    ///
    /// `issue` is called only when `url` has no entry, after the in-flight
    /// entry has been recorded. It receives the [`LoadCompletion`] to settle
    /// once the real load finishes, possibly before `issue` returns.
    pub fn request<F>(&self, url: &str, issue: F) -> LoadWaiter<V>
    where
        F: FnOnce(LoadCompletion<V>),
    {
        let inner = &self.inner;
        inner.total_requests.fetch_add(1, Ordering::Relaxed);

        let waiter = match inner.entries.entry(url.to_string()) {
            Entry::Occupied(mut entry) => match entry.get_mut() {
                Slot::Completed(value) => {
                    inner.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return LoadWaiter::ready(url, Ok(Arc::clone(value)));
                }
                Slot::InFlight { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.retain(|w| !w.is_closed());
                    waiters.push(tx);
                    inner.coalesced_requests.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        cache = inner.name,
                        url,
                        waiters = waiters.len(),
                        "Coalescing request behind in-flight load"
                    );
                    return LoadWaiter::pending(url, rx);
                }
            },
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel();
                entry.insert(Slot::InFlight { waiters: vec![tx] });
                inner.issued_loads.fetch_add(1, Ordering::Relaxed);
                LoadWaiter::pending(url, rx)
            }
        };

        debug!(cache = inner.name, url, "Issuing load");
        issue(LoadCompletion {
            cache: self.clone(),
            url: url.to_string(),
            settled: false,
        });
        waiter
    }

    /// State of `url`.
    pub fn state(&self, url: &str) -> LoadState {
        match self.inner.entries.get(url) {
            None => LoadState::Absent,
            Some(slot) => match slot.value() {
                Slot::InFlight { waiters } => LoadState::InFlight {
                    waiters: waiters.iter().filter(|w| !w.is_closed()).count(),
                },
                Slot::Completed(_) => LoadState::Completed,
            },
        }
    }

    /// Cached value for `url`, if its load has completed.
    pub fn get(&self, url: &str) -> Option<Arc<V>> {
        match self.inner.entries.get(url)?.value() {
            Slot::Completed(value) => Some(Arc::clone(value)),
            Slot::InFlight { .. } => None,
        }
    }

    /// Number of URLs in flight or completed.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns true if no URL has an entry.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Returns a snapshot of the current statistics.
    pub fn stats(&self) -> LoadCacheStats {
        let inner = &self.inner;
        LoadCacheStats {
            total_requests: inner.total_requests.load(Ordering::Relaxed),
            issued_loads: inner.issued_loads.load(Ordering::Relaxed),
            coalesced_requests: inner.coalesced_requests.load(Ordering::Relaxed),
            cache_hits: inner.cache_hits.load(Ordering::Relaxed),
        }
    }

    fn settle(&self, url: &str, result: Result<V, EngineError>) {
        let name = self.inner.name;
        match result {
            Ok(value) => {
                let value = Arc::new(value);
                let previous = self
                    .inner
                    .entries
                    .insert(url.to_string(), Slot::Completed(Arc::clone(&value)));
                let waiters = match previous {
                    Some(Slot::InFlight { waiters }) => waiters,
                    _ => Vec::new(),
                };
                info!(cache = name, url, waiters = waiters.len(), "Load completed");
                for tx in waiters {
                    let _ = tx.send(Ok(Arc::clone(&value)));
                }
            }
            Err(error) => {
                let waiters = self.take_in_flight(url);
                warn!(cache = name, url, waiters = waiters.len(), error = %error, "Load failed");
                let error = LoadError::Engine(error);
                for tx in waiters {
                    let _ = tx.send(Err(error.clone()));
                }
            }
        }
    }

    fn abandon(&self, url: &str) {
        let waiters = self.take_in_flight(url);
        warn!(
            cache = self.inner.name,
            url,
            waiters = waiters.len(),
            "Load dropped without completing"
        );
        for tx in waiters {
            let _ = tx.send(Err(LoadError::Abandoned {
                url: url.to_string(),
            }));
        }
    }

    fn take_in_flight(&self, url: &str) -> Vec<oneshot::Sender<LoadOutcome<V>>> {
        match self
            .inner
            .entries
            .remove_if(url, |_, slot| matches!(slot, Slot::InFlight { .. }))
        {
            Some((_, Slot::InFlight { waiters })) => waiters,
            _ => Vec::new(),
        }
    }
}

impl<V> fmt::Debug for LoadCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCache")
            .field("name", &self.inner.name)
            .field("entries", &self.inner.entries.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Handle used to settle one issued load.
///
/// Dropping it without calling [`complete`](Self::complete) abandons the
/// load: the entry is removed and queued callers receive
/// [`LoadError::Abandoned`].
pub struct LoadCompletion<V> {
    cache: LoadCache<V>,
    url: String,
    settled: bool,
}

impl<V> LoadCompletion<V> {
    /// URL being loaded.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Settle the load.
    ///
    /// On success the value is cached permanently and every queued caller
    /// receives the same `Arc`. On failure the entry is removed so a later
    /// request issues a fresh load.
    pub fn complete(mut self, result: Result<V, EngineError>) {
        self.settled = true;
        self.cache.settle(&self.url, result);
    }
}

impl<V> Drop for LoadCompletion<V> {
    fn drop(&mut self) {
        if !self.settled {
            self.cache.abandon(&self.url);
        }
    }
}

impl<V> fmt::Debug for LoadCompletion<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCompletion")
            .field("url", &self.url)
            .field("settled", &self.settled)
            .finish()
    }
}

/// Future resolving to the loaded value for one caller.
///
/// Polling again after the outcome was returned yields
/// [`LoadError::Consumed`].
#[must_use = "a load waiter does nothing unless awaited"]
pub struct LoadWaiter<V> {
    url: String,
    state: LoadWaiterState<V>,
}

enum LoadWaiterState<V> {
    Ready(LoadOutcome<V>),
    Pending(oneshot::Receiver<LoadOutcome<V>>),
    Done,
}

impl<V> LoadWaiter<V> {
    fn ready(url: &str, outcome: LoadOutcome<V>) -> Self {
        Self {
            url: url.to_string(),
            state: LoadWaiterState::Ready(outcome),
        }
    }

    fn pending(url: &str, rx: oneshot::Receiver<LoadOutcome<V>>) -> Self {
        Self {
            url: url.to_string(),
            state: LoadWaiterState::Pending(rx),
        }
    }

    /// Returns true if the value was already cached when requested.
    pub fn is_cached(&self) -> bool {
        matches!(self.state, LoadWaiterState::Ready(_))
    }
}

impl<V> Unpin for LoadWaiter<V> {}

impl<V> Future for LoadWaiter<V> {
    type Output = LoadOutcome<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match std::mem::replace(&mut this.state, LoadWaiterState::Done) {
            LoadWaiterState::Ready(outcome) => outcome,
            LoadWaiterState::Pending(mut rx) => match Pin::new(&mut rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => outcome,
                Poll::Ready(Err(_)) => Err(LoadError::Abandoned {
                    url: this.url.clone(),
                }),
                Poll::Pending => {
                    this.state = LoadWaiterState::Pending(rx);
                    return Poll::Pending;
                }
            },
            LoadWaiterState::Done => Err(LoadError::Consumed {
                url: this.url.clone(),
            }),
        };
        Poll::Ready(outcome)
    }
}

impl<V> fmt::Debug for LoadWaiter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = &self.url;
        match &self.state {
            LoadWaiterState::Ready(_) => write!(f, "LoadWaiter(cached {url})"),
            LoadWaiterState::Pending(_) => write!(f, "LoadWaiter(pending {url})"),
            LoadWaiterState::Done => write!(f, "LoadWaiter(done {url})"),
        }
    }
}
