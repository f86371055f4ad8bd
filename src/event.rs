use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::cache::{ResponseSource, Served};
use crate::net::{Request, ResponseKind};
use crate::worker::{ClickOutcome, Notification, SyncOutcome};

/// Events the host delivers to the worker
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
  Install,
  Activate,
  /// Request from a controlled page
  Fetch {
    url: String,
    method: Option<String>,
    accept: Option<String>,
  },
  /// Push message with optional text payload
  Push { payload: Option<String> },
  NotificationClick {
    action: Option<String>,
    tag: Option<String>,
  },
  /// Run one sync tag, or every registered one when no tag is given
  Sync { tag: Option<String> },
  RegisterSync { tag: String },
}

/// Result of handling one event, printed as JSON
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventOutcome {
  Installed { version: String, entries: usize },
  Activated { version: String, purged: Vec<String> },
  Fetched(FetchSummary),
  Notified { notification: Notification },
  Clicked(ClickOutcome),
  Synced { results: Vec<SyncOutcome> },
  SyncRegistered { tag: String },
}

/// What the page got back for a request
#[derive(Debug, Serialize)]
pub struct FetchSummary {
  pub method: String,
  pub url: String,
  pub source: ResponseSource,
  pub status: u16,
  pub kind: ResponseKind,
  pub bytes: usize,
  pub content_type: Option<String>,
  pub cached_at: Option<DateTime<Utc>>,
}

impl FetchSummary {
  pub fn new(request: &Request, served: &Served) -> Self {
    let response = &served.response;
    Self {
      method: request.method.to_string(),
      url: request.url.to_string(),
      source: served.source,
      status: response.status,
      kind: response.kind,
      bytes: response.body.len(),
      content_type: response.content_type().map(String::from),
      cached_at: served.cached_at,
    }
  }
}

/// Event handler that produces worker events from JSON lines
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl EventHandler {
  /// Read events from stdin
  pub fn new() -> Self {
    Self::from_reader(BufReader::new(tokio::io::stdin()))
  }

  /// Read events from any line source. Blank and malformed lines are skipped.
  pub fn from_reader<R>(reader: R) -> Self
  where
    R: AsyncBufRead + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn line reader
    tokio::spawn(async move {
      let mut lines = reader.lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) => {
            let line = line.trim();
            if line.is_empty() {
              continue;
            }
            match serde_json::from_str::<WorkerEvent>(line) {
              Ok(event) => {
                if tx.send(event).is_err() {
                  break;
                }
              }
              Err(e) => warn!(line, error = %e, "skipping malformed event"),
            }
          }
          Ok(None) => break,
          Err(e) => {
            warn!(error = %e, "failed to read events");
            break;
          }
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<WorkerEvent> {
    self.rx.recv().await
  }

  pub fn into_stream(self) -> impl Stream<Item = WorkerEvent> {
    futures::stream::unfold(self, |mut handler| async move {
      handler.next().await.map(|event| (event, handler))
    })
  }
}
