//! URL-keyed fragment cache with in-flight request deduplication.
//!
//! [`FragmentCache`] guarantees at most one network retrieval per URL at any
//! time across all consumers: concurrent requesters of the same URL share a
//! single in-flight future and observe the same outcome. Successful fetches
//! are promoted into the cache; failures leave the cache untouched so any
//! waiter or future caller may retry.
//!
//! The cache is an explicitly constructed, cheaply clonable service with its
//! lifecycle owned by the host application. There is no implicit singleton;
//! tests get isolation by constructing a fresh cache per test.

use crate::error::FetchError;
use crate::resource::ResourceFetcher;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type FetchFuture = Shared<BoxFuture<'static, Result<Arc<str>, FetchError>>>;

/// Both maps live behind one lock so the mutual-exclusivity invariant (a URL
/// is never in `entries` and `pending` simultaneously) holds at every
/// mutation point.
struct CacheState {
    entries: HashMap<String, Arc<str>>,
    pending: HashMap<String, FetchFuture>,
    /// Bumped by [`FragmentCache::clear`]; a retrieval started under an older
    /// generation skips its completion bookkeeping entirely.
    generation: u64,
}

/// Process-wide mapping from resolved absolute URL to fetched fragment text,
/// plus a parallel mapping from URL to its single in-flight retrieval.
#[derive(Clone)]
pub struct FragmentCache {
    state: Arc<Mutex<CacheState>>,
    fetcher: Arc<dyn ResourceFetcher>,
}

impl FragmentCache {
    /// Create a cache backed by the given fetcher.
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                pending: HashMap::new(),
                generation: 0,
            })),
            fetcher,
        }
    }

    /// Fetch a fragment, deduplicating against the cache and any in-flight
    /// retrieval for the same URL.
    ///
    /// - Cache hit: returns the cached text without touching the network.
    /// - Pending hit: joins the shared retrieval; all waiters observe the
    ///   identical completion, success or failure.
    /// - Miss: issues exactly one network retrieval. Success stores the result
    ///   and resolves every waiter; failure removes the pending entry (cache
    ///   untouched) and propagates to every waiter, so a later call retries.
    pub async fn fetch(&self, url: &str) -> Result<Arc<str>, FetchError> {
        let retrieval = {
            let mut state = self.state.lock().unwrap();
            if let Some(text) = state.entries.get(url) {
                log::debug!("fragment cache hit for {url}");
                return Ok(Arc::clone(text));
            }
            if let Some(pending) = state.pending.get(url) {
                log::debug!("joining in-flight retrieval for {url}");
                pending.clone()
            } else {
                log::debug!("starting retrieval for {url}");
                let retrieval = self.spawn_retrieval(url.to_string(), state.generation);
                state.pending.insert(url.to_string(), retrieval.clone());
                retrieval
            }
        };
        retrieval.await
    }

    /// Populate the cache ahead of use, returning the fetched text.
    ///
    /// If the URL is already cached this returns the cached value without a
    /// network call. If a retrieval is already in flight, `prefetch` joins it
    /// rather than racing an independent one, preserving the
    /// one-retrieval-per-URL property.
    pub async fn prefetch(&self, url: &str) -> Result<Arc<str>, FetchError> {
        self.fetch(url).await
    }

    /// Remove a single cache entry. Used by forced reload; the next fetch of
    /// `url` re-retrieves.
    pub fn evict(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.entries.remove(url);
    }

    /// Empty both the cache and the pending map for all consumers.
    ///
    /// Pipelines already past the fetch stage are unaffected. Retrievals still
    /// in flight keep running for their current waiters but no longer publish
    /// into the cache, so future calls re-retrieve.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.pending.clear();
        state.generation += 1;
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// True when no fragment is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `url` currently has a cached body.
    pub fn contains(&self, url: &str) -> bool {
        self.state.lock().unwrap().entries.contains_key(url)
    }

    /// Build the single shared retrieval future for `url`.
    ///
    /// The blocking fetcher runs on a worker thread; completion bookkeeping
    /// (promote to entry or drop from pending) executes exactly once inside
    /// the shared future, driven by whichever waiter polls it first.
    fn spawn_retrieval(&self, url: String, generation: u64) -> FetchFuture {
        let fetcher = Arc::clone(&self.fetcher);
        let state = Arc::clone(&self.state);
        async move {
            let joined = tokio::task::spawn_blocking({
                let url = url.clone();
                move || fetcher.fetch(&url)
            })
            .await;

            let result = match joined {
                Ok(inner) => inner,
                Err(err) => Err(FetchError::Transport {
                    url: url.clone(),
                    reason: format!("fetch worker failed: {err}"),
                }),
            };

            let mut state = state.lock().unwrap();
            if state.generation != generation {
                // The cache was cleared while this retrieval was in flight; deliver
                // the outcome to waiters without publishing it.
                return result.map(|fragment| Arc::from(fragment.text));
            }
            state.pending.remove(&url);
            match result {
                Ok(fragment) => {
                    let text: Arc<str> = Arc::from(fragment.text);
                    state.entries.insert(url, Arc::clone(&text));
                    Ok(text)
                }
                Err(err) => Err(err),
            }
        }
        .boxed()
        .shared()
    }
}
