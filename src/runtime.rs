//! Host runtime harness: drives an agent through its lifecycle and routes requests to it.

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::event::{FetchOutcome, Host, ServiceWorker};
use crate::net::{Network, Request, Response};

/// Host-side record of the signals an agent sent.
#[derive(Debug, Default)]
pub struct HostSignals {
  skip_waiting: AtomicBool,
  clients_claimed: AtomicBool,
}

impl HostSignals {
  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  pub fn clients_claimed(&self) -> bool {
    self.clients_claimed.load(Ordering::SeqCst)
  }
}

impl Host for HostSignals {
  fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  fn claim_clients(&self) {
    self.clients_claimed.store(true, Ordering::SeqCst);
  }
}

/// Lifecycle position of the registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  /// Installed, waiting for the previous agent's clients to go away
  Installed,
  Activating,
  Activated,
}

/// Plays the browser's part: fires lifecycle events and owns the default network path.
pub struct HostRuntime {
  worker: Arc<dyn ServiceWorker>,
  network: Arc<dyn Network>,
  signals: HostSignals,
  state: Mutex<WorkerState>,
  /// Whether an older agent still controls open clients
  has_predecessor: bool,
}

impl HostRuntime {
  pub fn new(worker: Arc<dyn ServiceWorker>, network: Arc<dyn Network>) -> Self {
    Self {
      worker,
      network,
      signals: HostSignals::default(),
      state: Mutex::new(WorkerState::Parsed),
      has_predecessor: false,
    }
  }

  /// Pretend an older agent controls clients, so activation waits unless skipped.
  pub fn with_predecessor(mut self, has_predecessor: bool) -> Self {
    self.has_predecessor = has_predecessor;
    self
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set_state(&self, state: WorkerState) {
    debug!(?state, "Worker state changed");
    *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
  }

  pub fn signals(&self) -> &HostSignals {
    &self.signals
  }

  /// Whether fetches from open clients are routed to the agent.
  pub fn controls_clients(&self) -> bool {
    self.state() == WorkerState::Activated
      && (self.signals.clients_claimed() || !self.has_predecessor)
  }

  /// Install the agent, then activate it unless it has to wait for a predecessor.
  pub async fn register(&self) -> WorkerState {
    self.set_state(WorkerState::Installing);
    self.worker.on_install(&self.signals).await;
    self.set_state(WorkerState::Installed);

    if self.has_predecessor && !self.signals.skip_waiting_requested() {
      info!("Agent installed, waiting for existing clients to close");
      return self.state();
    }

    self.activate().await;
    self.state()
  }

  /// Run the activate event. A no-op until install has completed.
  pub async fn activate(&self) {
    if self.state() != WorkerState::Installed {
      return;
    }

    self.set_state(WorkerState::Activating);
    self.worker.on_activate(&self.signals).await;
    self.set_state(WorkerState::Activated);
    info!(
      clients_claimed = self.signals.clients_claimed(),
      "Agent activated"
    );
  }

  /// Route a request through the agent if it controls clients, else straight to the network.
  pub async fn fetch(&self, request: &Request) -> Result<Response> {
    if !self.controls_clients() {
      return self.network.fetch(request).await;
    }

    match self.worker.on_fetch(request).await {
      FetchOutcome::Respond { response, source } => {
        debug!(url = %request.url, ?source, status = response.status, "Agent responded");
        Ok(response)
      }
      FetchOutcome::Passthrough => self.network.fetch(request).await,
    }
  }
}
