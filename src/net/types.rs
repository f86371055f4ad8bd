use reqwest::Method;
use serde::Serialize;
use std::fmt;
use url::Url;

use crate::cache::RequestKey;

/// An outbound request from a controlled page.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Case-insensitive header lookup, first match wins.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }

  /// Whether this is an HTML navigation. A missing Accept header is not one.
  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .map(|accept| accept.contains("text/html"))
      .unwrap_or(false)
  }

  pub fn key(&self) -> RequestKey {
    RequestKey::new(self.method.as_str(), &self.url)
  }
}

/// How the response relates to the worker's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
  /// Same-origin, fully inspectable
  Basic,
  /// Cross-origin, readable
  Cors,
  /// Cross-origin, body and status hidden
  Opaque,
}

impl ResponseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(Self::Basic),
      "cors" => Some(Self::Cors),
      "opaque" => Some(Self::Opaque),
      _ => None,
    }
  }
}

/// A fully buffered response. Cloning it is how the worker stores one copy
/// and hands the other to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  /// Final URL after redirects
  pub url: Url,
  pub status: u16,
  pub kind: ResponseKind,
  pub redirected: bool,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only same-origin, non-redirected 200 responses are written to the cache.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseKind::Basic && !self.redirected
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn content_type(&self) -> Option<&str> {
    self.header("content-type")
  }
}

/// The network layer could not produce a response at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkError {
  pub url: String,
  pub reason: String,
}

impl NetworkError {
  pub fn new(url: &Url, reason: impl Into<String>) -> Self {
    Self {
      url: url.to_string(),
      reason: reason.into(),
    }
  }
}

impl fmt::Display for NetworkError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Network request to {} failed: {}", self.url, self.reason)
  }
}

impl std::error::Error for NetworkError {}
