use crate::cache::SqliteStorage;
use crate::commands::Command;
use crate::config::Config;
use crate::event::{EventHandler, EventOutcome, FetchSummary, WorkerEvent};
use crate::net::HttpNetwork;
use crate::worker::{LogHost, Worker, WorkerState};
use color_eyre::{eyre::eyre, Result};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Main application state: one worker per process start
pub struct App {
  worker: Worker<SqliteStorage, HttpNetwork, LogHost>,

  /// Default limit for concurrently handled stdin events
  concurrency: usize,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let worker_config = config.worker_config()?;
    let storage = SqliteStorage::open(config.storage.path.as_deref())?;
    let network = HttpNetwork::new(&worker_config.origin, &config.network)?;

    Ok(Self {
      worker: Worker::new(worker_config, Arc::new(storage), network, LogHost),
      concurrency: config.events.concurrency.max(1),
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Install => self.emit(WorkerEvent::Install).await,
      Command::Activate => self.emit(WorkerEvent::Activate).await,
      Command::Update => {
        if self.worker.state()? == WorkerState::Active {
          info!(version = %self.worker.config().version, "already active, skipping install");
        } else {
          self.emit(WorkerEvent::Install).await?;
        }
        self.emit(WorkerEvent::Activate).await
      }
      Command::Fetch {
        url,
        method,
        accept,
        output,
      } => {
        let request = self
          .worker
          .request(&url, Some(method.as_str()), accept.as_deref())?;
        let served = self.worker.handle_fetch(&request).await?;
        if let Some(path) = output {
          std::fs::write(&path, &served.response.body)
            .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
        }
        print_json(&EventOutcome::Fetched(FetchSummary::new(&request, &served)))
      }
      Command::Push { payload } => self.emit(WorkerEvent::Push { payload }).await,
      Command::Click { action, tag } => {
        self
          .emit(WorkerEvent::NotificationClick { action, tag })
          .await
      }
      Command::RegisterSync { tag } => self.emit(WorkerEvent::RegisterSync { tag }).await,
      Command::Sync { tag } => self.emit(WorkerEvent::Sync { tag }).await,
      Command::Status => print_json(&self.worker.status()?),
      Command::Events { concurrency } => {
        self
          .run_events(concurrency.unwrap_or(self.concurrency).max(1))
          .await
      }
    }
  }

  async fn emit(&self, event: WorkerEvent) -> Result<()> {
    let outcome = self.worker.dispatch(event).await?;
    print_json(&outcome)
  }

  /// Handle stdin events until EOF, one JSON line out per event.
  ///
  /// A failed event is reported on its own line and never stops the stream.
  async fn run_events(&self, concurrency: usize) -> Result<()> {
    info!(concurrency, "reading events from stdin");

    EventHandler::new()
      .into_stream()
      .for_each_concurrent(concurrency, |event| async move {
        let line = match self.worker.dispatch(event).await {
          Ok(outcome) => serde_json::to_string(&outcome),
          Err(e) => {
            warn!(error = %e, "event failed");
            serde_json::to_string(&serde_json::json!({
              "event": "error",
              "message": e.to_string(),
            }))
          }
        };
        match line {
          Ok(line) => println!("{}", line),
          Err(e) => warn!(error = %e, "failed to serialize outcome"),
        }
      })
      .await;

    Ok(())
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let json =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", json);
  Ok(())
}
