//! Core types for the caching system.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use crate::net::{Request, Response};

/// Identity of a cached request: method plus URL, fragment removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: Url,
}

impl RequestKey {
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.to_ascii_uppercase(),
      url,
    }
  }

  pub fn get(url: &Url) -> Self {
    Self::new("GET", url)
  }

  pub fn from_request(request: &Request) -> Self {
    Self::new(request.method.as_str(), &request.url)
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Stable, fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form, e.g. `GET https://example.com/index.html`.
  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// A stored response snapshot together with where and when it was written.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// Generation the snapshot was found in
  pub generation: String,
  pub stored_at: DateTime<Utc>,
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Stored snapshot, no network contact
  Cache,
  /// Fresh from the network
  Network,
  /// Network failed; cached offline page served instead
  OfflineFallback,
  /// Network failed and nothing cached applied
  Synthesized,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_fragment_is_ignored() {
    let a = RequestKey::get(&url("https://example.com/app/#settings"));
    let b = RequestKey::get(&url("https://example.com/app/"));
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_query_is_part_of_identity() {
    let a = RequestKey::get(&url("https://example.com/data.json?page=1"));
    let b = RequestKey::get(&url("https://example.com/data.json?page=2"));
    assert_ne!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_method_is_part_of_identity() {
    let u = url("https://example.com/form");
    let get = RequestKey::new("get", &u);
    let post = RequestKey::new("POST", &u);
    assert_eq!(get.method(), "GET");
    assert_ne!(get.cache_hash(), post.cache_hash());
  }

  #[test]
  fn test_hash_is_hex_sha256() {
    let key = RequestKey::get(&url("https://example.com/"));
    let hash = key.cache_hash();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(key.description(), "GET https://example.com/");
  }
}
