//! Deferred background sync.

use color_eyre::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Host, Worker};
use crate::cache::CacheStorage;
use crate::net::Network;

/// Result of running one sync tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncOutcome {
  /// Work ran; `refreshed` cache entries were rewritten
  Completed { tag: String, refreshed: usize },
  /// Tag has no handler
  Ignored { tag: String },
  /// Worker not active yet; the registration is kept for a later run
  Deferred { tag: String },
  /// Work failed; the registration is kept for the next attempt
  Failed { tag: String, error: String },
}

impl<S: CacheStorage, N: Network, H: Host> Worker<S, N, H> {
  /// Record a sync request from a page, to run once connectivity allows.
  pub fn register_sync(&self, tag: &str) -> Result<()> {
    self.storage.register_sync(tag)?;
    info!(tag, "sync registered");
    Ok(())
  }

  /// Run the work for one sync tag.
  ///
  /// Only the configured tag does anything. An error tells the host to
  /// reschedule.
  pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome> {
    if tag != self.config.sync_tag {
      debug!(tag, "no handler for sync tag");
      return Ok(SyncOutcome::Ignored {
        tag: tag.to_string(),
      });
    }

    if !self.state()?.can_intercept_fetch() {
      debug!(tag, version = %self.config.version, "worker not active, deferring sync");
      return Ok(SyncOutcome::Deferred {
        tag: tag.to_string(),
      });
    }

    info!(tag, "background sync");
    let refreshed = self.revalidate().await?;
    info!(tag, refreshed, "background sync complete");

    Ok(SyncOutcome::Completed {
      tag: tag.to_string(),
      refreshed,
    })
  }

  /// Run every registered sync tag once.
  ///
  /// Completed and ignored tags are removed; deferred and failed ones stay
  /// registered.
  pub async fn sync_pending(&self) -> Result<Vec<SyncOutcome>> {
    let mut outcomes = Vec::new();

    for tag in self.storage.pending_syncs()? {
      match self.handle_sync(&tag).await {
        Ok(outcome @ SyncOutcome::Deferred { .. }) => outcomes.push(outcome),
        Ok(outcome) => {
          self.storage.remove_sync(&tag)?;
          outcomes.push(outcome);
        }
        Err(e) => {
          warn!(tag = %tag, error = %e, "sync failed, keeping registration");
          outcomes.push(SyncOutcome::Failed {
            tag,
            error: e.to_string(),
          });
        }
      }
    }

    Ok(outcomes)
  }

  /// Re-fetch the manifest into the current generation.
  ///
  /// Idempotent; fails without writing if any URL is unreachable. Only
  /// cacheable responses overwrite their entries, the rest keep the copy
  /// stored at install.
  async fn revalidate(&self) -> Result<usize> {
    let (fresh, skipped): (Vec<_>, Vec<_>) = self
      .fetch_manifest()
      .await?
      .into_iter()
      .partition(|(_, response)| response.is_cacheable());

    for (key, response) in &skipped {
      debug!(%key, status = response.status, kind = response.kind.as_str(), "keeping cached copy");
    }
    self.cache.store_all(&fresh)?;
    Ok(fresh.len())
  }
}
