//! Scripted network, recording host and helpers for worker tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

use super::{Host, Notification, Worker};
use crate::cache::{
  CacheStorage, CachedEntry, GenerationInfo, Registration, RequestKey, SqliteStorage,
};
use crate::config::{Config, WorkerConfig};
use crate::net::{Network, NetworkError, Request, Response, ResponseKind};
use crate::worker::WorkerState;

pub type TestWorker = Worker<SqliteStorage, FakeNetwork, RecordingHost>;

pub const ORIGIN: &str = "http://localhost:8080";

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn body_for(path: &str) -> String {
  format!("<html>{}</html>", path)
}

pub fn basic(url: &Url, status: u16, body: &str) -> Response {
  Response {
    url: url.clone(),
    status,
    kind: ResponseKind::Basic,
    redirected: false,
    headers: vec![("content-type".to_string(), "text/html".to_string())],
    body: body.as_bytes().to_vec(),
  }
}

pub fn cross_origin(url: &Url, body: &str) -> Response {
  Response {
    kind: ResponseKind::Cors,
    ..basic(url, 200, body)
  }
}

pub fn test_config(version: &str, manifest: &[&str]) -> WorkerConfig {
  let mut config = Config::default();
  config.cache.version = version.to_string();
  config.cache.origin = ORIGIN.to_string();
  config.cache.manifest = manifest.iter().map(|s| s.to_string()).collect();
  config.worker_config().unwrap()
}

pub fn shared_storage() -> Arc<SqliteStorage> {
  Arc::new(SqliteStorage::open_in_memory().unwrap())
}

pub fn test_worker(version: &str, manifest: &[&str], storage: Arc<SqliteStorage>) -> TestWorker {
  Worker::new(
    test_config(version, manifest),
    storage,
    FakeNetwork::default(),
    RecordingHost::default(),
  )
}

pub fn flaky_worker(
  version: &str,
  manifest: &[&str],
  storage: Arc<FlakyStorage>,
) -> Worker<FlakyStorage, FakeNetwork, RecordingHost> {
  Worker::new(
    test_config(version, manifest),
    storage,
    FakeNetwork::default(),
    RecordingHost::default(),
  )
}

/// Route every manifest path to a 200 page whose body is `body_for(path)`.
pub fn serve_manifest(network: &FakeNetwork, manifest: &[&str]) {
  for path in manifest {
    let target = url(path);
    let response = if target.origin() == url("/").origin() {
      basic(&target, 200, &body_for(path))
    } else {
      cross_origin(&target, &body_for(path))
    };
    network.respond(response);
  }
}

#[derive(Default)]
struct NetworkState {
  routes: HashMap<String, Option<Response>>,
  calls: Vec<String>,
}

/// Network answering from a route table. Unknown URLs behave as offline.
#[derive(Clone, Default)]
pub struct FakeNetwork {
  state: Arc<Mutex<NetworkState>>,
}

impl FakeNetwork {
  /// Serve `response` for requests to its own URL.
  pub fn respond(&self, response: Response) {
    let target = response.url.clone();
    self.respond_at(&target, response);
  }

  pub fn respond_at(&self, target: &Url, response: Response) {
    let mut state = self.state.lock().unwrap();
    state.routes.insert(target.to_string(), Some(response));
  }

  /// Make requests to `target` fail at the network layer.
  pub fn fail(&self, target: &Url) {
    let mut state = self.state.lock().unwrap();
    state.routes.insert(target.to_string(), None);
  }

  pub fn calls(&self) -> Vec<String> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn calls_to(&self, target: &Url) -> usize {
    let suffix = format!(" {}", target);
    self
      .calls()
      .iter()
      .filter(|call| call.ends_with(&suffix))
      .count()
  }

  pub fn clear_calls(&self) {
    self.state.lock().unwrap().calls.clear();
  }
}

impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let mut state = self.state.lock().unwrap();
    state.calls.push(format!("{} {}", request.method, request.url));

    match state.routes.get(request.url.as_str()) {
      Some(Some(response)) => Ok(response.clone()),
      _ => Err(NetworkError::new(&request.url, "offline")),
    }
  }
}

#[derive(Default)]
struct HostState {
  shown: Vec<Notification>,
  closed: Vec<String>,
  opened: Vec<Url>,
  fail_display: bool,
}

/// Host that records every effect.
#[derive(Clone, Default)]
pub struct RecordingHost {
  state: Arc<Mutex<HostState>>,
}

impl RecordingHost {
  pub fn shown(&self) -> Vec<Notification> {
    self.state.lock().unwrap().shown.clone()
  }

  pub fn closed(&self) -> Vec<String> {
    self.state.lock().unwrap().closed.clone()
  }

  pub fn opened(&self) -> Vec<Url> {
    self.state.lock().unwrap().opened.clone()
  }

  pub fn fail_display(&self) {
    self.state.lock().unwrap().fail_display = true;
  }
}

impl Host for RecordingHost {
  async fn show_notification(&self, notification: &Notification) -> Result<()> {
    let mut state = self.state.lock().unwrap();
    if state.fail_display {
      return Err(eyre!("notification permission denied"));
    }
    state.shown.push(notification.clone());
    Ok(())
  }

  async fn close_notification(&self, tag: &str) -> Result<()> {
    self.state.lock().unwrap().closed.push(tag.to_string());
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    self.state.lock().unwrap().opened.push(url.clone());
    Ok(())
  }
}

/// SQLite storage with injected failures.
pub struct FlakyStorage {
  inner: SqliteStorage,
  broken_generation: Option<String>,
  broken_worker: Option<String>,
  broken_lookup: Option<RequestKey>,
  broken_write: Option<RequestKey>,
}

impl FlakyStorage {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
      broken_generation: None,
      broken_worker: None,
      broken_lookup: None,
      broken_write: None,
    }
  }

  /// Deleting generation `name` always fails.
  pub fn fail_delete(mut self, name: &str) -> Self {
    self.broken_generation = Some(name.to_string());
    self
  }

  /// Changing the state of worker `version` always fails.
  pub fn fail_state(mut self, version: &str) -> Self {
    self.broken_worker = Some(version.to_string());
    self
  }

  /// Looking up GET `target` always fails.
  pub fn fail_lookup(mut self, target: &Url) -> Self {
    self.broken_lookup = Some(RequestKey::get(target));
    self
  }

  /// Writing GET `target` always fails.
  pub fn fail_write(mut self, target: &Url) -> Self {
    self.broken_write = Some(RequestKey::get(target));
    self
  }
}

impl CacheStorage for FlakyStorage {
  fn generation_names(&self) -> Result<Vec<String>> {
    self.inner.generation_names()
  }

  fn generations(&self) -> Result<Vec<GenerationInfo>> {
    self.inner.generations()
  }

  fn match_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    if self.broken_lookup.as_ref() == Some(key) {
      return Err(eyre!("disk I/O error"));
    }
    self.inner.match_entry(generation, key)
  }

  fn put_entry(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    if self.broken_write.as_ref() == Some(key) {
      return Err(eyre!("database or disk is full"));
    }
    self.inner.put_entry(generation, key, response)
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.inner.put_all(generation, entries)
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    if self.broken_generation.as_deref() == Some(name) {
      return Err(eyre!("database is locked"));
    }
    self.inner.delete_generation(name)
  }

  fn worker_state(&self, version: &str) -> Result<WorkerState> {
    self.inner.worker_state(version)
  }

  fn set_worker_state(&self, version: &str, state: WorkerState) -> Result<()> {
    if self.broken_worker.as_deref() == Some(version) {
      return Err(eyre!("database is locked"));
    }
    self.inner.set_worker_state(version, state)
  }

  fn registrations(&self) -> Result<Vec<Registration>> {
    self.inner.registrations()
  }

  fn register_sync(&self, tag: &str) -> Result<()> {
    self.inner.register_sync(tag)
  }

  fn pending_syncs(&self) -> Result<Vec<String>> {
    self.inner.pending_syncs()
  }

  fn remove_sync(&self, tag: &str) -> Result<()> {
    self.inner.remove_sync(tag)
  }
}
