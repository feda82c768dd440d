//! The cache agent: install, activate and fetch handlers over a cache store and a network.

mod activate;
mod fetch;
mod install;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheStorage, RequestKey};
use crate::config::AgentConfig;
use crate::event::{FetchOutcome, Host, ServiceWorker};
use crate::net::{Network, Request, Response};

/// Cache-first offline agent.
///
/// Holds no scheduling logic of its own: the host decides when each handler
/// runs. Cloning is cheap and clones share storage, network and pending work.
pub struct CacheAgent<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  config: Arc<AgentConfig>,
  /// Background cache writes not yet awaited
  pending: Arc<Mutex<JoinSet<()>>>,
}

impl<S, N> CacheAgent<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  pub fn new(config: AgentConfig, storage: S, network: N) -> Self {
    Self::with_shared(config, Arc::new(storage), Arc::new(network))
  }

  /// Build an agent over storage and network the caller keeps handles to.
  pub fn with_shared(config: AgentConfig, storage: Arc<S>, network: Arc<N>) -> Self {
    Self {
      storage,
      network,
      config: Arc::new(config),
      pending: Arc::new(Mutex::new(JoinSet::new())),
    }
  }

  pub fn config(&self) -> &AgentConfig {
    &self.config
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Wait for every background cache write spawned so far.
  pub async fn settle(&self) {
    let mut pending = {
      let mut guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
      std::mem::replace(&mut *guard, JoinSet::new())
    };

    while let Some(result) = pending.join_next().await {
      if let Err(err) = result {
        warn!(error = %err, "Background cache write did not complete");
      }
    }
  }

  /// Run a storage call on the blocking pool. SQLite never runs on an async worker thread.
  async fn with_storage<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
  {
    let storage = Arc::clone(&self.storage);
    tokio::task::spawn_blocking(move || f(&storage))
      .await
      .map_err(|e| eyre!("Storage task did not complete: {}", e))?
  }

  /// Store a response under the current generation without making the caller wait.
  fn store_in_background(&self, key: RequestKey, response: Response) {
    let storage = Arc::clone(&self.storage);
    let generation = self.config.cache_name.clone();

    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    // Reap writes that already finished
    while let Some(result) = pending.try_join_next() {
      if let Err(err) = result {
        warn!(error = %err, "Background cache write did not complete");
      }
    }

    pending.spawn_blocking(move || match storage.put(&generation, &key, &response) {
      Ok(()) => debug!(request = %key.description(), %generation, "Cached network response"),
      Err(err) => warn!(request = %key.description(), error = %err, "Could not cache response"),
    });
  }
}

impl<S: CacheStorage, N: Network> Clone for CacheAgent<S, N> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      network: Arc::clone(&self.network),
      config: Arc::clone(&self.config),
      pending: Arc::clone(&self.pending),
    }
  }
}

#[async_trait]
impl<S, N> ServiceWorker for CacheAgent<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  async fn on_install(&self, host: &dyn Host) {
    let report = self.install().await;
    if report.is_complete() {
      info!(cached = report.cached.len(), "Install finished");
    } else {
      warn!(
        cached = report.cached.len(),
        skipped = report.skipped.len(),
        "Install finished with uncached assets"
      );
    }
    host.skip_waiting();
  }

  async fn on_activate(&self, host: &dyn Host) {
    let report = self.activate().await;
    info!(
      deleted = ?report.deleted,
      failed = report.failed.len(),
      "Stale cache generations removed"
    );
    host.claim_clients();
  }

  async fn on_fetch(&self, request: &Request) -> FetchOutcome {
    self.fetch(request).await
  }
}
