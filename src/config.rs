use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default cache generation name of the shipped portal build.
pub const DEFAULT_VERSION: &str = "realtor-app-v1.0.0";

/// Pages and third-party assets precached at install.
const DEFAULT_MANIFEST: &[&str] = &[
  "/",
  "/主頁.html",
  "/loan-calc.html",
  "/decor-calc.html",
  "/tax-calc.html",
  "/rate.html",
  "/weather.html",
  "/garbage.html",
  "/receipt.html",
  "/bus.html",
  "/fortune.html",
  "/mbti.html",
  "/daily-quote.html",
  "/showcase.html",
  "/hot.html",
  "/grant-housing.html",
  "/grant-renovation.html",
  "/manifest.json",
  "https://cdn.tailwindcss.com",
  "https://cdn.jsdelivr.net/npm/swiper@11/swiper-bundle.min.css",
];

const ICON: &str = r#"data:image/svg+xml,%3Csvg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 192 192"%3E%3Cdefs%3E%3ClinearGradient id="grad1" x1="0%25" y1="0%25" x2="100%25" y2="100%25"%3E%3Cstop offset="0%25" style="stop-color:%236366f1;stop-opacity:1" /%3E%3Cstop offset="100%25" style="stop-color:%238b5cf6;stop-opacity:1" /%3E%3C/linearGradient%3E%3C/defs%3E%3Crect width="192" height="192" rx="32" fill="url(%23grad1)"/%3E%3Ctext x="96" y="110" font-family="Arial, sans-serif" font-size="80" font-weight="bold" text-anchor="middle" fill="white"%3E🏠%3C/text%3E%3C/svg%3E"#;
const BADGE: &str = r#"data:image/svg+xml,%3Csvg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 96 96"%3E%3Crect width="96" height="96" rx="16" fill="%23ef4444"/%3E%3Ctext x="48" y="60" font-size="40" text-anchor="middle" fill="white"%3E🔔%3C/text%3E%3C/svg%3E"#;
const EXPLORE_ICON: &str = r#"data:image/svg+xml,%3Csvg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 48 48"%3E%3Crect width="48" height="48" rx="8" fill="%2310b981"/%3E%3Ctext x="24" y="30" font-size="20" text-anchor="middle" fill="white"%3E👀%3C/text%3E%3C/svg%3E"#;
const CLOSE_ICON: &str = r#"data:image/svg+xml,%3Csvg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 48 48"%3E%3Crect width="48" height="48" rx="8" fill="%236b7280"/%3E%3Ctext x="24" y="30" font-size="20" text-anchor="middle" fill="white"%3E❌%3C/text%3E%3C/svg%3E"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub cache: CacheConfig,
  pub notification: NotificationConfig,
  pub sync: SyncConfig,
  pub network: NetworkConfig,
  pub storage: StorageConfig,
  pub logging: LoggingConfig,
  pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Cache generation name; bumping it invalidates every older generation
  pub version: String,
  /// Origin the controlled pages are served from
  pub origin: String,
  /// URLs precached at install, root-relative or absolute
  pub manifest: Vec<String>,
  /// Page served to navigations that fail while offline
  pub fallback_page: String,
  /// Window opened by notification clicks
  pub root_url: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: DEFAULT_VERSION.to_string(),
      origin: "http://localhost:8080".to_string(),
      manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
      fallback_page: "/主頁.html".to_string(),
      root_url: "/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  /// Body used when a push arrives without payload
  pub default_body: String,
  /// Tag shared by every notification this worker shows
  pub tag: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub explore_title: String,
  pub explore_icon: String,
  pub close_title: String,
  pub close_icon: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "濬瑒房產生活平台".to_string(),
      default_body: "您有新的提醒".to_string(),
      tag: "realtor-app".to_string(),
      icon: ICON.to_string(),
      badge: BADGE.to_string(),
      vibrate: vec![200, 100, 200],
      explore_title: "查看詳情".to_string(),
      explore_icon: EXPLORE_ICON.to_string(),
      close_title: "關閉".to_string(),
      close_icon: CLOSE_ICON.to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// The only sync tag that runs work; others are ignored
  pub tag: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "background-sync".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: u64,
  pub user_agent: String,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 30,
      user_agent: concat!("swcache/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

impl NetworkConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Database path (default: $XDG_DATA_HOME/swcache/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive used when RUST_LOG is unset (e.g. "info", "swcache=debug")
  pub level: Option<String>,
  /// Also write logs to this file, rotated daily
  pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
  /// Maximum events from the stdin stream handled at once
  pub concurrency: usize,
}

impl Default for EventsConfig {
  fn default() -> Self {
    Self { concurrency: 8 }
  }
}

/// Immutable worker configuration with every URL resolved against the origin.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  pub version: String,
  pub origin: Url,
  pub manifest: Vec<Url>,
  pub fallback_page: Url,
  pub root_url: Url,
  pub notification: NotificationConfig,
  pub sync_tag: String,
}

impl WorkerConfig {
  /// Resolve a root-relative or absolute URL against the origin.
  pub fn resolve(&self, url: &str) -> Result<Url> {
    resolve(&self.origin, url)
  }
}

fn resolve(origin: &Url, url: &str) -> Result<Url> {
  origin
    .join(url)
    .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var("SWCACHE_ORIGIN") {
      config.cache.origin = origin;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Build the worker configuration, resolving the manifest against the origin.
  ///
  /// Duplicate manifest entries collapse into one, keeping the first position.
  pub fn worker_config(&self) -> Result<WorkerConfig> {
    let cache = &self.cache;
    if cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }

    let origin = Url::parse(&cache.origin)
      .map_err(|e| eyre!("Invalid cache.origin '{}': {}", cache.origin, e))?;

    let mut manifest: Vec<Url> = Vec::with_capacity(cache.manifest.len());
    for entry in &cache.manifest {
      let url = resolve(&origin, entry)?;
      if !manifest.contains(&url) {
        manifest.push(url);
      }
    }

    Ok(WorkerConfig {
      version: cache.version.clone(),
      fallback_page: resolve(&origin, &cache.fallback_page)?,
      root_url: resolve(&origin, &cache.root_url)?,
      origin,
      manifest,
      notification: self.notification.clone(),
      sync_tag: self.sync.tag.clone(),
    })
  }
}
