//! Cache store for the agent.
//!
//! This module provides named cache generations that:
//! - Map a request identity (method + URL) to a stored response snapshot
//! - Can be enumerated in creation order and deleted wholesale
//! - Resolve concurrent writes to the same key by last write wins

mod storage;
#[cfg(test)]
pub mod testing;
mod traits;

pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CachedResponse, RequestKey, ResponseSource};
