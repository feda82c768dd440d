//! Lifecycle event interface between the agent and its host runtime.

use async_trait::async_trait;

use crate::cache::ResponseSource;
use crate::net::{Request, Response};

/// Signals an agent can send back to the host runtime while handling an event.
pub trait Host: Send + Sync {
  /// Activate as soon as install finishes instead of waiting for old clients to close.
  fn skip_waiting(&self);

  /// Take control of already-open clients without a reload.
  fn claim_clients(&self);
}

/// Result of intercepting a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// Not ours; the host performs its default network fetch
  Passthrough,
  /// The agent answers with this response
  Respond {
    response: Response,
    source: ResponseSource,
  },
}

impl FetchOutcome {
  pub fn respond(response: Response, source: ResponseSource) -> Self {
    Self::Respond { response, source }
  }
}

#[cfg(test)]
impl FetchOutcome {
  pub fn response(&self) -> Option<&Response> {
    match self {
      Self::Passthrough => None,
      Self::Respond { response, .. } => Some(response),
    }
  }

  pub fn source(&self) -> Option<ResponseSource> {
    match self {
      Self::Passthrough => None,
      Self::Respond { source, .. } => Some(*source),
    }
  }
}

/// The three lifecycle hooks a host invokes.
///
/// The host awaits each returned future before treating the event as settled,
/// so work that must finish before a lifecycle transition belongs inside it.
#[async_trait]
pub trait ServiceWorker: Send + Sync {
  async fn on_install(&self, host: &dyn Host);

  async fn on_activate(&self, host: &dyn Host);

  async fn on_fetch(&self, request: &Request) -> FetchOutcome;
}
