//! Versioned request cache backing the offline worker.
//!
//! This module provides:
//! - Named cache generations of (method, URL) -> response entries
//! - Cache-first serving with opportunistic population
//! - An offline fallback page for failed navigations
//! - Wholesale invalidation by generation name

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, GenerationInfo, Registration, SqliteStorage};
pub use traits::{CachedEntry, RequestKey, ResponseSource, Served};
