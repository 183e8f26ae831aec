//! Request/response model and the origin network client.
//!
//! Requests are keyed for caching by a stable hash of their normalized
//! path and query. Responses are fully buffered (`StoredResponse`), so the
//! same value can be written to a cache tier and handed to the caller
//! without a one-shot body being consumed twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self { method, url }
  }

  /// Build a GET request from an absolute URL string.
  pub fn get(url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Failed to parse request URL {}: {}", url, e))?;
    Ok(Self::new(Method::GET, url))
  }

  /// Build a GET request for a path on the given origin.
  pub fn get_on(base: &Url, path: &str) -> Result<Self> {
    let url = base
      .join(path)
      .map_err(|e| eyre!("Failed to resolve {} against {}: {}", path, base, e))?;
    Ok(Self::new(Method::GET, url))
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }

  /// Stable cache key for this request.
  pub fn cache_key(&self) -> String {
    match self.url.query() {
      Some(query) => request_key(&format!("{}?{}", self.url.path(), query)),
      None => request_key(self.url.path()),
    }
  }
}

/// Hash a normalized `path?query` string into a stable, fixed-length key.
///
/// The fragment is never part of the input, so two requests differing only
/// in fragment share one cache entry.
pub fn request_key(path_and_query: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(path_and_query.as_bytes());
  hex::encode(hasher.finalize())
}

/// A fully-buffered response, as stored in a cache tier and as returned to
/// the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  /// When this response was produced (network arrival or cache write).
  pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
  pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
    Self {
      status,
      content_type,
      body,
      stored_at: Utc::now(),
    }
  }

  /// Whether the status indicates success (2xx). Only such responses are
  /// ever written to a cache tier.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Network seam for everything that talks to the origin.
///
/// Transport failures are `Err`; an HTTP error status is an `Ok` response
/// that the caller inspects. Strategies and the sync engine are generic
/// over this trait, so tests run against a scripted origin.
#[async_trait]
pub trait Origin: Send + Sync {
  /// Perform the request against the network.
  async fn fetch(&self, request: &Request) -> Result<StoredResponse>;

  /// POST a JSON payload to a path on the origin.
  async fn post_json(&self, path: &str, payload: &Value) -> Result<StoredResponse>;
}

#[async_trait]
impl<T: Origin + ?Sized> Origin for Arc<T> {
  async fn fetch(&self, request: &Request) -> Result<StoredResponse> {
    (**self).fetch(request).await
  }

  async fn post_json(&self, path: &str, payload: &Value) -> Result<StoredResponse> {
    (**self).post_json(path, payload).await
  }
}

/// reqwest-backed origin client bound to a base URL.
#[derive(Clone)]
pub struct OriginClient {
  base: Url,
  client: reqwest::Client,
}

impl OriginClient {
  pub fn new(base: &str) -> Result<Self> {
    let base = Url::parse(base).map_err(|e| eyre!("Failed to parse origin URL {}: {}", base, e))?;
    Ok(Self {
      base,
      client: reqwest::Client::new(),
    })
  }

  pub fn base(&self) -> &Url {
    &self.base
  }
}

#[async_trait]
impl Origin for OriginClient {
  async fn fetch(&self, request: &Request) -> Result<StoredResponse> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach origin for {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body for {}: {}", request.url, e))?;

    Ok(StoredResponse::new(status, content_type, body.to_vec()))
  }

  async fn post_json(&self, path: &str, payload: &Value) -> Result<StoredResponse> {
    let url = self
      .base
      .join(path)
      .map_err(|e| eyre!("Failed to resolve {} against {}: {}", path, self.base, e))?;

    let response = self
      .client
      .post(url.clone())
      .json(payload)
      .send()
      .await
      .map_err(|e| eyre!("Failed to POST to {}: {}", url, e))?;

    let status = response.status().as_u16();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body for {}: {}", url, e))?;

    Ok(StoredResponse::new(status, None, body.to_vec()))
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_key_ignores_fragment() {
    let a = Request::get("http://origin.test/products/1.jpg#gallery").unwrap();
    let b = Request::get("http://origin.test/products/1.jpg").unwrap();
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_cache_key_keeps_query() {
    let a = Request::get("http://origin.test/api/products?page=1").unwrap();
    let b = Request::get("http://origin.test/api/products?page=2").unwrap();
    assert_ne!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_cache_key_matches_path_key() {
    let request = Request::get("http://origin.test/offline.html").unwrap();
    assert_eq!(request.cache_key(), request_key("/offline.html"));
  }

  #[test]
  fn test_is_ok_bounds() {
    assert!(StoredResponse::new(200, None, vec![]).is_ok());
    assert!(StoredResponse::new(204, None, vec![]).is_ok());
    assert!(!StoredResponse::new(304, None, vec![]).is_ok());
    assert!(!StoredResponse::new(404, None, vec![]).is_ok());
    assert!(!StoredResponse::new(503, None, vec![]).is_ok());
  }
}
