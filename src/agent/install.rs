use color_eyre::{eyre::eyre, Result};
use tracing::warn;
use url::Url;

use super::CacheAgent;
use crate::cache::{CacheStorage, RequestKey};
use crate::net::{Network, Request};

/// What happened to each asset during install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: Vec<Url>,
  /// Assets that could not be cached, with the reason
  pub skipped: Vec<(Url, String)>,
}

impl InstallReport {
  pub fn is_complete(&self) -> bool {
    self.skipped.is_empty()
  }
}

impl<S, N> CacheAgent<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  /// Open the current generation and fetch-and-store every asset, one at a time.
  ///
  /// Never fails: an asset that cannot be fetched or stored is logged and skipped.
  /// Assets already cached are fetched again and overwritten.
  pub async fn install(&self) -> InstallReport {
    let generation = self.config.cache_name.clone();
    let mut report = InstallReport::default();

    let target = generation.clone();
    if let Err(err) = self.with_storage(move |s| s.open(&target)).await {
      warn!(%generation, error = %err, "Could not open cache generation");
    }

    for asset in &self.config.assets {
      match self.cache_asset(asset).await {
        Ok(()) => report.cached.push(asset.clone()),
        Err(err) => {
          warn!(%asset, error = %err, "Could not cache asset");
          report.skipped.push((asset.clone(), err.to_string()));
        }
      }
    }

    report
  }

  async fn cache_asset(&self, asset: &Url) -> Result<()> {
    let request = Request::get(asset.clone());
    let response = self
      .network
      .fetch(&request)
      .await
      .map_err(|e| eyre!("Failed to fetch asset: {}", e))?;

    if !response.is_success() {
      return Err(eyre!("Not ok: status {}", response.status));
    }

    let generation = self.config.cache_name.clone();
    let key = RequestKey::from_request(&request);
    self
      .with_storage(move |s| s.put(&generation, &key, &response))
      .await
      .map_err(|e| eyre!("Failed to store asset: {}", e))
  }
}
