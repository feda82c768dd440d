use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Name of the current cache generation. Bump it to rotate the cache on next activation.
pub const CACHE_NAME: &str = "dualpay-cache-v1";

/// Assets cached on install, relative to the registration scope ("" is the scope root).
pub const ASSET_PATHS: &[&str] = &[
  "",
  "index.html",
  "manifest.json",
  "icon-192.svg",
  "icon-512.svg",
];

/// Page served to navigations when the network is down.
pub const OFFLINE_PAGE: &str = "index.html";

/// Immutable agent configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct AgentConfig {
  pub cache_name: String,
  pub assets: Vec<Url>,
  pub offline_page: Url,
}

impl AgentConfig {
  pub fn new(cache_name: impl Into<String>, assets: Vec<Url>, offline_page: Url) -> Self {
    Self {
      cache_name: cache_name.into(),
      assets,
      offline_page,
    }
  }

  /// Build the compiled-in configuration for a registration scope.
  ///
  /// The scope is treated as a directory, so `https://host/app` and
  /// `https://host/app/` resolve assets identically.
  pub fn for_scope(scope: &Url) -> Result<Self> {
    let base = scope_base(scope);
    let resolve = |path: &str| {
      base
        .join(path)
        .map_err(|e| eyre!("Invalid asset path '{}' under {}: {}", path, base, e))
    };

    let assets = ASSET_PATHS
      .iter()
      .map(|path| resolve(path))
      .collect::<Result<Vec<_>>>()?;
    let offline_page = resolve(OFFLINE_PAGE)?;

    Ok(Self::new(CACHE_NAME, assets, offline_page))
  }
}

fn scope_base(scope: &Url) -> Url {
  let mut base = scope.clone();
  base.set_query(None);
  base.set_fragment(None);
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  base
}

/// Host-side settings for the runtime harness.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Registration scope the agent controls
  #[serde(default = "default_scope")]
  pub scope: Url,
  /// Cache database location (defaults to the platform data directory)
  pub storage_path: Option<PathBuf>,
  /// Write logs here instead of stderr
  pub log_file: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      scope: default_scope(),
      storage_path: None,
      log_file: None,
    }
  }
}

fn default_scope() -> Url {
  Url::parse("http://localhost:8080/").expect("static URL is valid")
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cache-agent.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cache-agent/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("cache-agent.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cache-agent").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_assets_resolve_against_scope() {
    let scope = Url::parse("https://user.github.io/dualpay/").unwrap();
    let config = AgentConfig::for_scope(&scope).unwrap();

    let assets: Vec<&str> = config.assets.iter().map(Url::as_str).collect();
    assert_eq!(
      assets,
      vec![
        "https://user.github.io/dualpay/",
        "https://user.github.io/dualpay/index.html",
        "https://user.github.io/dualpay/manifest.json",
        "https://user.github.io/dualpay/icon-192.svg",
        "https://user.github.io/dualpay/icon-512.svg",
      ]
    );
    assert_eq!(
      config.offline_page.as_str(),
      "https://user.github.io/dualpay/index.html"
    );
    assert_eq!(config.cache_name, CACHE_NAME);
  }

  #[test]
  fn test_scope_without_trailing_slash() {
    let scope = Url::parse("https://user.github.io/dualpay?x=1").unwrap();
    let config = AgentConfig::for_scope(&scope).unwrap();
    assert_eq!(config.assets[0].as_str(), "https://user.github.io/dualpay/");
  }

  #[test]
  fn test_load_from_yaml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "scope: https://example.com/app/").unwrap();
    writeln!(file, "storage_path: /tmp/agent.db").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.scope.as_str(), "https://example.com/app/");
    assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/agent.db")));
    assert!(config.log_file.is_none());
  }

  #[test]
  fn test_empty_yaml_uses_default_scope() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "log_file: agent.log").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.scope.as_str(), "http://localhost:8080/");
  }

  #[test]
  fn test_missing_explicit_config_is_an_error() {
    let result = Config::load(Some(Path::new("/nonexistent/cache-agent.yaml")));
    assert!(result.is_err());
  }
}
