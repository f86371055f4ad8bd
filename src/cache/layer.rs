//! Cache layer that orchestrates caching logic with network fetching.

use color_eyre::{Report, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CachedEntry, RequestKey, Served};
use crate::net::{NetworkError, Request, Response};

/// Cache layer bound to one cache generation.
///
/// This layer sits between the worker and the network, serving
/// cache-first with an offline fallback page for navigations.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// Name of the current generation
  generation: String,
}

impl<S: CacheStorage> CacheLayer<S> {
  pub fn new(storage: Arc<S>, generation: impl Into<String>) -> Self {
    Self {
      storage,
      generation: generation.into(),
    }
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - a hit is returned without touching the network
  /// 2. On a miss, fetch from network
  /// 3. Store a copy of cacheable responses (failures here are only logged)
  /// 4. On network failure, serve `fallback` for HTML navigations
  pub async fn fetch<F, Fut>(
    &self,
    request: &Request,
    fallback: Option<&RequestKey>,
    fetcher: F,
  ) -> Result<Served>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, NetworkError>>,
  {
    let key = request.key();

    // A broken store must not stop the page from loading
    match self.storage.match_entry(&self.generation, &key) {
      Ok(Some(entry)) => {
        debug!(%key, "cache hit");
        return Ok(Served::from_cache(entry));
      }
      Ok(None) => debug!(%key, "cache miss"),
      Err(e) => warn!(%key, error = %e, "cache lookup failed, going to network"),
    }

    match fetcher().await {
      Ok(response) => {
        if response.is_cacheable() {
          self.store(&key, &response);
        } else {
          debug!(%key, status = response.status, kind = response.kind.as_str(), "response not cacheable");
        }
        Ok(Served::from_network(response))
      }
      Err(err) => {
        warn!(%key, error = %err, "network request failed");
        if request.accepts_html() {
          if let Some(entry) = fallback.and_then(|k| self.lookup(k)) {
            return Ok(Served::offline(entry));
          }
          warn!(%key, "no fallback page cached");
        }
        Err(Report::new(err))
      }
    }
  }

  /// Best-effort write; storage errors never reach the caller.
  pub fn store(&self, key: &RequestKey, response: &Response) {
    match self.storage.put_entry(&self.generation, key, response) {
      Ok(()) => debug!(%key, "cached"),
      Err(e) => warn!(%key, error = %e, "failed to cache response"),
    }
  }

  fn lookup(&self, key: &RequestKey) -> Option<CachedEntry> {
    self
      .storage
      .match_entry(&self.generation, key)
      .map_err(|e| warn!(%key, error = %e, "fallback lookup failed"))
      .ok()
      .flatten()
  }

  /// Store every entry as one unit of work.
  pub fn store_all(&self, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.storage.put_all(&self.generation, entries)
  }

  /// Delete every generation except the current one.
  ///
  /// Each deletion is independent: a failure is logged and the rest continue.
  /// Returns the names actually deleted.
  pub fn purge_stale(&self) -> Result<Vec<String>> {
    let mut purged = Vec::new();

    for name in self.storage.generation_names()? {
      if name == self.generation {
        continue;
      }
      match self.storage.delete_generation(&name) {
        Ok(_) => purged.push(name),
        Err(e) => warn!(cache = %name, error = %e, "failed to delete stale cache"),
      }
    }

    Ok(purged)
  }
}
