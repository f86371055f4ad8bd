//! Push notifications and notification clicks.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use super::Worker;
use crate::cache::CacheStorage;
use crate::config::NotificationConfig;
use crate::net::Network;

/// The platform side the worker talks to for user-visible effects.
#[allow(async_fn_in_trait)]
pub trait Host {
  /// Display a notification. Resolves once it is shown.
  async fn show_notification(&self, notification: &Notification) -> Result<()>;

  /// Dismiss the notification(s) with this tag.
  async fn close_notification(&self, tag: &str) -> Result<()>;

  /// Open (or focus) a window at `url`.
  async fn open_window(&self, url: &Url) -> Result<()>;
}

/// Host for command-line use: every effect becomes a log line.
pub struct LogHost;

impl Host for LogHost {
  async fn show_notification(&self, notification: &Notification) -> Result<()> {
    info!(
      title = %notification.title,
      body = %notification.body,
      tag = %notification.tag,
      "notification shown"
    );
    Ok(())
  }

  async fn close_notification(&self, tag: &str) -> Result<()> {
    info!(tag, "notification closed");
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    info!(%url, "window opened");
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationButton {
  pub action: String,
  pub title: String,
  pub icon: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationData {
  pub date_of_arrival: DateTime<Utc>,
  pub primary_key: u32,
}

/// A notification built from a push message.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub tag: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub actions: Vec<NotificationButton>,
  pub data: NotificationData,
}

impl Notification {
  pub fn new(config: &NotificationConfig, body: String, arrived_at: DateTime<Utc>) -> Self {
    Self {
      title: config.title.clone(),
      body,
      tag: config.tag.clone(),
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      vibrate: config.vibrate.clone(),
      actions: vec![
        NotificationButton {
          action: NotificationAction::EXPLORE.to_string(),
          title: config.explore_title.clone(),
          icon: config.explore_icon.clone(),
        },
        NotificationButton {
          action: NotificationAction::CLOSE.to_string(),
          title: config.close_title.clone(),
          icon: config.close_icon.clone(),
        },
      ],
      data: NotificationData {
        date_of_arrival: arrived_at,
        primary_key: 1,
      },
    }
  }
}

/// What a notification click asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
  Explore,
  Close,
  /// Body click or an unrecognized action
  Default,
}

impl NotificationAction {
  pub const EXPLORE: &'static str = "explore";
  pub const CLOSE: &'static str = "close";

  pub fn parse(action: Option<&str>) -> Self {
    match action {
      Some(Self::EXPLORE) => Self::Explore,
      Some(Self::CLOSE) => Self::Close,
      _ => Self::Default,
    }
  }

  /// Whether this action opens the root window.
  pub fn opens_window(self) -> bool {
    !matches!(self, Self::Close)
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClickOutcome {
  pub action: Option<String>,
  /// Window opened in response, if any
  pub opened: Option<Url>,
}

impl<S: CacheStorage, N: Network, H: Host> Worker<S, N, H> {
  /// Turn a push message into a displayed notification.
  ///
  /// A missing or empty payload gets the default reminder body. Display is
  /// awaited; the host must not consider the push handled before that.
  pub async fn handle_push(&self, payload: Option<&[u8]>) -> Result<Notification> {
    let config = &self.config.notification;
    let body = payload
      .filter(|p| !p.is_empty())
      .map(|p| String::from_utf8_lossy(p).into_owned())
      .unwrap_or_else(|| config.default_body.clone());

    let notification = Notification::new(config, body, Utc::now());
    self.host.show_notification(&notification).await?;
    info!(tag = %notification.tag, "push handled");

    Ok(notification)
  }

  /// Dismiss the clicked notification, then open the root URL unless the
  /// action was `close`.
  pub async fn handle_notification_click(
    &self,
    tag: Option<&str>,
    action: Option<&str>,
  ) -> Result<ClickOutcome> {
    let tag = tag.unwrap_or(&self.config.notification.tag);
    if let Err(e) = self.host.close_notification(tag).await {
      warn!(tag, error = %e, "failed to dismiss notification");
    }

    let opened = if NotificationAction::parse(action).opens_window() {
      let root = self.config.root_url.clone();
      self.host.open_window(&root).await?;
      Some(root)
    } else {
      info!(tag, "notification dismissed");
      None
    };

    Ok(ClickOutcome {
      action: action.map(String::from),
      opened,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use super::*;

  #[test]
  fn test_action_parse() {
    assert_eq!(NotificationAction::parse(Some("explore")), NotificationAction::Explore);
    assert_eq!(NotificationAction::parse(Some("close")), NotificationAction::Close);
    assert_eq!(NotificationAction::parse(Some("share")), NotificationAction::Default);
    assert_eq!(NotificationAction::parse(None), NotificationAction::Default);
  }

  #[tokio::test]
  async fn test_push_without_payload_uses_default_body() {
    let worker = test_worker("v1", &["/"], shared_storage());

    for payload in [None, Some(&b""[..])] {
      let notification = worker.handle_push(payload).await.unwrap();
      assert_eq!(notification.body, "您有新的提醒");
    }
    assert_eq!(worker.host.shown().len(), 2);
  }

  #[tokio::test]
  async fn test_push_payload_becomes_body() {
    let worker = test_worker("v1", &["/"], shared_storage());

    let notification = worker
      .handle_push(Some("新盤推介".as_bytes()))
      .await
      .unwrap();

    assert_eq!(notification.body, "新盤推介");
    assert_eq!(notification.title, "濬瑒房產生活平台");
    assert_eq!(notification.vibrate, vec![200, 100, 200]);
    let actions: Vec<&str> = notification
      .actions
      .iter()
      .map(|a| a.action.as_str())
      .collect();
    assert_eq!(actions, vec!["explore", "close"]);
    assert_eq!(worker.host.shown()[0].body, "新盤推介");
  }

  #[tokio::test]
  async fn test_notification_carries_artwork() {
    let worker = test_worker("v1", &["/"], shared_storage());
    let notification = worker.handle_push(None).await.unwrap();

    assert!(notification.icon.contains("linearGradient"));
    assert!(notification.badge.starts_with("data:image/svg+xml,"));
    assert!(notification.actions[0].icon.contains("%2310b981"));
    assert!(notification.actions[1].icon.contains("%236b7280"));
  }

  #[tokio::test]
  async fn test_push_display_failure_is_reported() {
    let worker = test_worker("v1", &["/"], shared_storage());
    worker.host.fail_display();

    assert!(worker.handle_push(None).await.is_err());
  }

  #[tokio::test]
  async fn test_close_action_opens_nothing() {
    let worker = test_worker("v1", &["/"], shared_storage());

    let outcome = worker
      .handle_notification_click(None, Some("close"))
      .await
      .unwrap();

    assert!(outcome.opened.is_none());
    assert!(worker.host.opened().is_empty());
    assert_eq!(worker.host.closed(), vec!["realtor-app".to_string()]);
  }

  #[tokio::test]
  async fn test_other_actions_open_root_once() {
    for action in [Some("explore"), Some("share"), None] {
      let worker = test_worker("v1", &["/"], shared_storage());

      let outcome = worker
        .handle_notification_click(Some("promo"), action)
        .await
        .unwrap();

      assert_eq!(outcome.opened, Some(url("/")));
      assert_eq!(worker.host.opened(), vec![url("/")]);
      assert_eq!(worker.host.closed(), vec!["promo".to_string()]);
    }
  }
}
