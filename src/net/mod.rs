//! Network access used by the worker on cache misses and at install.

mod client;
mod types;

pub use client::HttpNetwork;
pub use types::{NetworkError, Request, Response, ResponseKind};

/// Performs network fetches on behalf of the worker.
///
/// An `Err` means no response was produced (offline, DNS, timeout); HTTP
/// error statuses are still `Ok` responses.
#[allow(async_fn_in_trait)]
pub trait Network {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}
