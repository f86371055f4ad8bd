//! Command-line subcommands, one per worker event plus inspection.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Precache the manifest into the configured cache version
  Install,
  /// Promote the installed version and delete every other cache
  Activate,
  /// Install (unless already active), then activate
  Update,
  /// Handle one request as a controlled page would issue it
  Fetch {
    /// Root-relative or absolute URL
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Accept header; include text/html for page navigations
    #[arg(long)]
    accept: Option<String>,
    /// Write the response body to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Deliver a push message
  Push {
    /// Text payload (default reminder text when omitted)
    payload: Option<String>,
  },
  /// Click the worker's notification
  Click {
    /// Action button: explore or close (omit for a body click)
    #[arg(long)]
    action: Option<String>,
    /// Notification tag (default: the configured tag)
    #[arg(long)]
    tag: Option<String>,
  },
  /// Record a sync request from a page
  RegisterSync { tag: String },
  /// Run a sync tag, or every registered one when no tag is given
  Sync { tag: Option<String> },
  /// Show worker state, caches and pending syncs
  Status,
  /// Read JSON-line events from stdin and handle them concurrently
  Events {
    /// Maximum events in flight (default from config)
    #[arg(long)]
    concurrency: Option<usize>,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    let mut argv = vec!["swcache"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
  }

  #[test]
  fn test_fetch_defaults_to_get() {
    match parse(&["fetch", "/rate.html"]) {
      Command::Fetch {
        url,
        method,
        accept,
        output,
      } => {
        assert_eq!(url, "/rate.html");
        assert_eq!(method, "GET");
        assert!(accept.is_none());
        assert!(output.is_none());
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }

  #[test]
  fn test_fetch_with_options() {
    match parse(&["fetch", "/", "-X", "POST", "--accept", "text/html"]) {
      Command::Fetch { method, accept, .. } => {
        assert_eq!(method, "POST");
        assert_eq!(accept.as_deref(), Some("text/html"));
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }

  #[test]
  fn test_sync_tag_optional() {
    assert!(matches!(parse(&["sync"]), Command::Sync { tag: None }));
    assert!(matches!(
      parse(&["register-sync", "background-sync"]),
      Command::RegisterSync { .. }
    ));
  }

  #[test]
  fn test_click_action() {
    match parse(&["click", "--action", "close"]) {
      Command::Click { action, tag } => {
        assert_eq!(action.as_deref(), Some("close"));
        assert!(tag.is_none());
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }
}
