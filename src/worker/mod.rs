//! The offline cache worker: one instance per process start.
//!
//! Every handler is an async function the host must await before it
//! considers the event handled. The worker keeps no durable state in
//! memory; lifecycle state and cached responses live in the storage.

mod lifecycle;
mod notify;
mod sync;
#[cfg(test)]
mod testing;

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheLayer, CacheStorage, GenerationInfo, Registration, RequestKey, Served};
use crate::config::WorkerConfig;
use crate::event::{EventOutcome, FetchSummary, WorkerEvent};
use crate::net::{Network, Request, Response};

pub use lifecycle::WorkerState;
pub use notify::{ClickOutcome, Host, LogHost, Notification};
pub use sync::SyncOutcome;

/// Snapshot of everything the store knows about workers and caches.
#[derive(Debug, Serialize)]
pub struct StatusReport {
  pub version: String,
  pub state: WorkerState,
  pub generations: Vec<GenerationInfo>,
  pub registrations: Vec<Registration>,
  pub pending_syncs: Vec<String>,
}

pub struct Worker<S: CacheStorage, N: Network, H: Host> {
  config: Arc<WorkerConfig>,
  storage: Arc<S>,
  cache: CacheLayer<S>,
  network: N,
  host: H,
}

impl<S: CacheStorage, N: Network, H: Host> Worker<S, N, H> {
  pub fn new(config: WorkerConfig, storage: Arc<S>, network: N, host: H) -> Self {
    let cache = CacheLayer::new(Arc::clone(&storage), config.version.clone());
    Self {
      config: Arc::new(config),
      storage,
      cache,
      network,
      host,
    }
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.config
  }

  /// Persisted lifecycle state of this worker's version.
  pub fn state(&self) -> Result<WorkerState> {
    self.storage.worker_state(&self.config.version)
  }

  pub fn status(&self) -> Result<StatusReport> {
    Ok(StatusReport {
      version: self.config.version.clone(),
      state: self.state()?,
      generations: self.storage.generations()?,
      registrations: self.storage.registrations()?,
      pending_syncs: self.storage.pending_syncs()?,
    })
  }

  /// Build a page request for a root-relative or absolute URL.
  pub fn request(&self, url: &str, method: Option<&str>, accept: Option<&str>) -> Result<Request> {
    let url = self.config.resolve(url)?;
    let method = match method {
      Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", m, e))?,
      None => Method::GET,
    };

    let request = Request::new(method, url);
    Ok(match accept {
      Some(accept) => request.with_header("Accept", accept),
      None => request,
    })
  }

  /// Handle one event from the host.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    match event {
      WorkerEvent::Install => {
        let entries = self.install().await?;
        Ok(EventOutcome::Installed {
          version: self.config.version.clone(),
          entries,
        })
      }
      WorkerEvent::Activate => {
        let purged = self.activate().await?;
        Ok(EventOutcome::Activated {
          version: self.config.version.clone(),
          purged,
        })
      }
      WorkerEvent::Fetch {
        url,
        method,
        accept,
      } => {
        let request = self.request(&url, method.as_deref(), accept.as_deref())?;
        let served = self.handle_fetch(&request).await?;
        Ok(EventOutcome::Fetched(FetchSummary::new(&request, &served)))
      }
      WorkerEvent::Push { payload } => {
        let notification = self
          .handle_push(payload.as_deref().map(str::as_bytes))
          .await?;
        Ok(EventOutcome::Notified { notification })
      }
      WorkerEvent::NotificationClick { action, tag } => {
        let outcome = self
          .handle_notification_click(tag.as_deref(), action.as_deref())
          .await?;
        Ok(EventOutcome::Clicked(outcome))
      }
      WorkerEvent::Sync { tag: Some(tag) } => {
        let result = self.handle_sync(&tag).await?;
        Ok(EventOutcome::Synced {
          results: vec![result],
        })
      }
      WorkerEvent::Sync { tag: None } => {
        let results = self.sync_pending().await?;
        Ok(EventOutcome::Synced { results })
      }
      WorkerEvent::RegisterSync { tag } => {
        self.register_sync(&tag)?;
        Ok(EventOutcome::SyncRegistered { tag })
      }
    }
  }

  /// Lifecycle state with interrupted transitions resolved.
  ///
  /// A process killed mid-event leaves `installing` or `activating` behind.
  /// Those resolve to the settled state a retry starts from: `installed`
  /// when this version's generation was written, `uninstalled` otherwise.
  fn settled_state(&self) -> Result<WorkerState> {
    let version = self.config.version.as_str();
    let state = match self.state()? {
      WorkerState::Installing => {
        let cached = self.storage.generation_names()?.iter().any(|n| n == version);
        if cached {
          WorkerState::Installed
        } else {
          WorkerState::Uninstalled
        }
      }
      WorkerState::Activating => WorkerState::Installed,
      state => return Ok(state),
    };
    warn!(version, settled = %state, "resuming interrupted lifecycle event");
    Ok(state)
  }

  /// Precache the manifest into this version's generation.
  ///
  /// All-or-nothing: if any manifest URL fails, nothing is written and the
  /// version rolls back to its previous state so the host can retry.
  /// Returns the number of entries stored.
  pub async fn install(&self) -> Result<usize> {
    let version = self.config.version.as_str();
    let previous = self.settled_state()?;
    let installing = previous.transition(WorkerState::Installing)?;
    self.storage.set_worker_state(version, installing)?;
    info!(version, urls = self.config.manifest.len(), "installing worker");

    match self.precache().await {
      Ok(entries) => {
        self.storage.set_worker_state(version, WorkerState::Installed)?;
        info!(version, entries, "worker installed");
        Ok(entries)
      }
      Err(e) => {
        // Roll back, the previous generation (if any) is untouched
        self.storage.set_worker_state(version, previous)?;
        warn!(version, error = %e, "install failed");
        Err(e.wrap_err(format!("Failed to install {}", version)))
      }
    }
  }

  /// Fetch every manifest URL, then store them in one transaction.
  async fn precache(&self) -> Result<usize> {
    let entries = self.fetch_manifest().await?;
    self.cache.store_all(&entries)?;
    Ok(entries.len())
  }

  /// Fetch every manifest URL, failing as a whole if any one fails.
  async fn fetch_manifest(&self) -> Result<Vec<(RequestKey, Response)>> {
    let requests: Vec<Request> = self
      .config
      .manifest
      .iter()
      .cloned()
      .map(Request::get)
      .collect();

    let responses = try_join_all(requests.iter().map(|r| self.fetch_required(r))).await?;

    Ok(
      requests
        .iter()
        .map(Request::key)
        .zip(responses)
        .collect(),
    )
  }

  async fn fetch_required(&self, request: &Request) -> Result<Response> {
    let response = self.network.fetch(request).await?;
    if !response.is_ok() {
      return Err(eyre!(
        "Request for {} failed with status {}",
        request.url,
        response.status
      ));
    }
    debug!(url = %request.url, bytes = response.body.len(), "fetched manifest entry");
    Ok(response)
  }

  /// Promote this version: purge every other generation and start intercepting.
  ///
  /// Stale generations are deleted independently and older versions are
  /// retired one by one; failures are logged and never block promotion.
  /// Returns the deleted generation names.
  pub async fn activate(&self) -> Result<Vec<String>> {
    let version = self.config.version.as_str();
    match self.settled_state()? {
      WorkerState::Active => debug!(version, "already active"),
      state => {
        let activating = state.transition(WorkerState::Activating)?;
        self.storage.set_worker_state(version, activating)?;
      }
    }
    info!(version, "activating worker");

    let purged = self.cache.purge_stale().unwrap_or_else(|e| {
      warn!(error = %e, "failed to list caches");
      Vec::new()
    });
    for name in &purged {
      info!(cache = %name, "deleted old cache");
    }
    self.retire_others();

    self.storage.set_worker_state(version, WorkerState::Active)?;
    info!(version, purged = purged.len(), "worker active");
    Ok(purged)
  }

  /// Mark every other installed or active version redundant.
  fn retire_others(&self) {
    let registrations = match self.storage.registrations() {
      Ok(registrations) => registrations,
      Err(e) => {
        warn!(error = %e, "failed to list workers");
        return;
      }
    };

    for registration in registrations {
      let superseded = matches!(
        registration.state,
        WorkerState::Active | WorkerState::Installed
      );
      if registration.version == self.config.version || !superseded {
        continue;
      }
      match self
        .storage
        .set_worker_state(&registration.version, WorkerState::Redundant)
      {
        Ok(()) => debug!(version = %registration.version, "worker redundant"),
        Err(e) => warn!(version = %registration.version, error = %e, "failed to retire worker"),
      }
    }
  }

  /// Generation of the version currently controlling pages, if any.
  ///
  /// A waiting version does not take over: while another version is
  /// active, requests keep being served from that version's cache.
  fn controller(&self) -> Option<String> {
    let registrations = match self.storage.registrations() {
      Ok(registrations) => registrations,
      Err(e) => {
        warn!(error = %e, "failed to read worker state");
        return None;
      }
    };

    let active: Vec<String> = registrations
      .into_iter()
      .filter(|r| r.state.can_intercept_fetch())
      .map(|r| r.version)
      .collect();
    if active.iter().any(|v| *v == self.config.version) {
      return Some(self.config.version.clone());
    }
    active.into_iter().next()
  }

  /// Intercept a request from a controlled page.
  ///
  /// Non-GET requests, and every request while no version is active,
  /// go straight to the network.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Served> {
    if !request.is_get() {
      debug!(method = %request.method, url = %request.url, "not intercepted");
      return self.passthrough(request).await;
    }

    let Some(generation) = self.controller() else {
      debug!(url = %request.url, "no active worker, not intercepted");
      return self.passthrough(request).await;
    };

    let fallback = RequestKey::get(&self.config.fallback_page);
    if generation == self.config.version {
      self
        .cache
        .fetch(request, Some(&fallback), || self.network.fetch(request))
        .await
    } else {
      debug!(url = %request.url, controller = %generation, "served by active version");
      let cache = CacheLayer::new(Arc::clone(&self.storage), generation);
      cache
        .fetch(request, Some(&fallback), || self.network.fetch(request))
        .await
    }
  }

  async fn passthrough(&self, request: &Request) -> Result<Served> {
    let response = self.network.fetch(request).await?;
    Ok(Served::passthrough(response))
  }
}
