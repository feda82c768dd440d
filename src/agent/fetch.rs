use chrono::Utc;
use reqwest::Method;
use tracing::{debug, warn};

use super::CacheAgent;
use crate::cache::{CacheStorage, CachedResponse, RequestKey, ResponseSource};
use crate::event::FetchOutcome;
use crate::net::{Network, Request, Response};

impl<S, N> CacheAgent<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  /// Cache-first interception.
  ///
  /// 1. Non-GET requests pass through untouched
  /// 2. A cached snapshot (any generation) is returned without touching the network
  /// 3. Otherwise fetch; 2xx responses are stored in the background
  /// 4. On network failure, HTML requests get the cached offline page, everything else a 503
  pub async fn fetch(&self, request: &Request) -> FetchOutcome {
    if request.method != Method::GET {
      return FetchOutcome::Passthrough;
    }

    let key = RequestKey::from_request(request);
    if let Some(cached) = self.lookup(&key).await {
      debug!(
        request = %key.description(),
        generation = %cached.generation,
        age_secs = (Utc::now() - cached.stored_at).num_seconds(),
        "Cache hit"
      );
      return FetchOutcome::respond(cached.response, ResponseSource::Cache);
    }

    debug!(request = %key.description(), "Cache miss, going to network");
    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self.store_in_background(key, response.clone());
        }
        FetchOutcome::respond(response, ResponseSource::Network)
      }
      Err(err) => {
        warn!(request = %key.description(), error = %err, "Network fetch failed");
        self.offline_response(request).await
      }
    }
  }

  async fn offline_response(&self, request: &Request) -> FetchOutcome {
    if request.accepts_html() {
      let offline_key = RequestKey::get(&self.config.offline_page);
      if let Some(fallback) = self.lookup(&offline_key).await {
        return FetchOutcome::respond(fallback.response, ResponseSource::OfflineFallback);
      }
    }

    FetchOutcome::respond(Response::offline(), ResponseSource::Synthesized)
  }

  /// Lookup across all generations. A storage error counts as a miss.
  async fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
    let owned = key.clone();
    self
      .with_storage(move |s| s.match_any(&owned))
      .await
      .unwrap_or_else(|err| {
        warn!(request = %key.description(), error = %err, "Cache lookup failed");
        None
      })
  }
}
