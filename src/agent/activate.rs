use tracing::{info, warn};

use super::CacheAgent;
use crate::cache::CacheStorage;
use crate::net::Network;

/// Stale generations removed (or not) during activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  pub deleted: Vec<String>,
  pub failed: Vec<(String, String)>,
}

impl<S, N> CacheAgent<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  /// Delete every generation except the current one.
  ///
  /// Each deletion is independent; one failing does not stop the others.
  pub async fn activate(&self) -> ActivateReport {
    let current = self.config.cache_name.clone();
    let mut report = ActivateReport::default();

    let names = match self.with_storage(|s| s.keys()).await {
      Ok(names) => names,
      Err(err) => {
        warn!(error = %err, "Could not list cache generations");
        return report;
      }
    };

    for name in names.into_iter().filter(|name| *name != current) {
      let target = name.clone();
      match self.with_storage(move |s| s.delete(&target)).await {
        Ok(_) => {
          info!(generation = %name, "Deleted stale cache generation");
          report.deleted.push(name);
        }
        Err(err) => {
          warn!(generation = %name, error = %err, "Could not delete stale cache generation");
          report.failed.push((name, err.to_string()));
        }
      }
    }

    report
  }
}
