//! Scripted network for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};

use super::{Network, Request, Response};

/// Network that answers from a fixed route table. Unknown URLs fail like a dropped connection.
#[derive(Default)]
pub struct StubNetwork {
  routes: Mutex<HashMap<String, Response>>,
  calls: AtomicUsize,
}

impl StubNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_route(self, url: &str, response: Response) -> Self {
    self.route(url, response);
    self
  }

  pub fn route(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  /// Take a URL offline.
  pub fn drop_route(&self, url: &str) {
    self.routes.lock().unwrap().remove(url);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Network for StubNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self
      .routes
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(|| eyre!("Connection refused: {}", request.url))
  }
}
