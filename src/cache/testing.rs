//! Storage with injectable faults for tests.

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{CacheStorage, CachedResponse, RequestKey, SqliteStorage};
use crate::net::Response;

/// In-memory SQLite storage that can be told to fail or stall specific calls.
pub struct FaultyStorage {
  inner: SqliteStorage,
  fail_put: bool,
  fail_match: bool,
  fail_delete: Option<&'static str>,
  put_delay: Option<Duration>,
  puts_finished: AtomicUsize,
}

impl FaultyStorage {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::in_memory().unwrap(),
      fail_put: false,
      fail_match: false,
      fail_delete: None,
      put_delay: None,
      puts_finished: AtomicUsize::new(0),
    }
  }

  pub fn failing_put(mut self) -> Self {
    self.fail_put = true;
    self
  }

  pub fn failing_match(mut self) -> Self {
    self.fail_match = true;
    self
  }

  pub fn failing_delete_of(mut self, generation: &'static str) -> Self {
    self.fail_delete = Some(generation);
    self
  }

  pub fn slow_put(mut self, delay: Duration) -> Self {
    self.put_delay = Some(delay);
    self
  }

  /// Puts that have returned, successfully or not.
  pub fn puts_finished(&self) -> usize {
    self.puts_finished.load(Ordering::SeqCst)
  }
}

impl CacheStorage for FaultyStorage {
  fn open(&self, generation: &str) -> Result<()> {
    self.inner.open(generation)
  }

  fn keys(&self) -> Result<Vec<String>> {
    self.inner.keys()
  }

  fn delete(&self, generation: &str) -> Result<bool> {
    if self.fail_delete == Some(generation) {
      return Err(eyre!("disk full"));
    }
    self.inner.delete(generation)
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    if let Some(delay) = self.put_delay {
      std::thread::sleep(delay);
    }
    let result = if self.fail_put {
      Err(eyre!("disk full"))
    } else {
      self.inner.put(generation, key, response)
    };
    self.puts_finished.fetch_add(1, Ordering::SeqCst);
    result
  }

  fn match_in(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.inner.match_in(generation, key)
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    if self.fail_match {
      return Err(eyre!("database is locked"));
    }
    self.inner.match_any(key)
  }

  fn requests(&self, generation: &str) -> Result<Vec<RequestKey>> {
    self.inner.requests(generation)
  }
}
