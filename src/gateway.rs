//! The serve pipeline: classify a request, run its strategy against the
//! tier store and the network, and produce exactly one outcome.

use color_eyre::Result;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{Tier, TierStore};
use crate::http::{request_key, Origin, Request, StoredResponse};
use crate::router::{self, ResourceClass};
use crate::strategy::{self, Strategy, OFFLINE_PAGE_PATH};

/// The single outcome of handling an intercepted request.
///
/// Every handled request is served; non-GET requests are declined and reach
/// the network untouched.
#[derive(Debug)]
pub enum FetchOutcome {
  Served(StoredResponse),
  Passthrough,
}

impl FetchOutcome {
  pub fn into_response(self) -> Option<StoredResponse> {
    match self {
      FetchOutcome::Served(response) => Some(response),
      FetchOutcome::Passthrough => None,
    }
  }
}

/// Request-serving front of the layer.
///
/// The host application routes every outgoing request through
/// [`Gateway::handle`]. The store is injected; there is no ambient cache
/// state.
pub struct Gateway<S, O> {
  store: Arc<S>,
  origin: O,
}

impl<S: TierStore, O: Origin> Gateway<S, O> {
  pub fn new(store: Arc<S>, origin: O) -> Self {
    Self { store, origin }
  }

  /// Serve one request. Every strategy path terminates in a response; the
  /// sole unrecovered outcome is a static asset with no cache entry and a
  /// failed network, which propagates the network error.
  pub async fn handle(&self, request: &Request) -> Result<FetchOutcome> {
    let class = match router::classify(request) {
      Some(class) => class,
      None => return Ok(FetchOutcome::Passthrough),
    };

    let response = match class.strategy() {
      Strategy::NetworkFirst => self.network_first(request, class).await?,
      Strategy::CacheFirst => self.cache_first(request, class).await?,
      Strategy::CacheFirstWithPlaceholder => match self.cache_first(request, class).await {
        Ok(response) => response,
        Err(error) => {
          debug!(path = request.path(), %error, "Image unavailable, serving placeholder");
          strategy::placeholder_image_response()
        }
      },
    };

    Ok(FetchOutcome::Served(response))
  }

  /// Network first; on success store the ok response; on network failure
  /// fall back to cache, then to the class's synthesized response.
  async fn network_first(&self, request: &Request, class: ResourceClass) -> Result<StoredResponse> {
    let tier = class.tier();
    let key = request.cache_key();

    match self.origin.fetch(request).await {
      Ok(response) => {
        self.cache_if_ok(tier, &key, &response)?;
        Ok(response)
      }
      Err(error) => {
        debug!(path = request.path(), %error, "Network failed, falling back to cache");

        if let Some(cached) = self.store.lookup(tier, &key)? {
          return Ok(cached);
        }

        match class {
          ResourceClass::Api => Ok(strategy::offline_api_response()),
          _ => self.offline_page(),
        }
      }
    }
  }

  /// Cache hit short-circuits with no network call; a miss fetches and
  /// stores an ok response. Total failure propagates.
  async fn cache_first(&self, request: &Request, class: ResourceClass) -> Result<StoredResponse> {
    let tier = class.tier();
    let key = request.cache_key();

    if let Some(cached) = self.store.lookup(tier, &key)? {
      debug!(path = request.path(), tier = tier.name(), "Cache hit");
      return Ok(cached);
    }

    let response = self.origin.fetch(request).await?;
    self.cache_if_ok(tier, &key, &response)?;
    Ok(response)
  }

  /// Only ok-status responses are ever written to a tier.
  fn cache_if_ok(&self, tier: Tier, key: &str, response: &StoredResponse) -> Result<()> {
    if response.is_ok() {
      self.store.put(tier, key, response)?;
    }
    Ok(())
  }

  /// Page fallback: the cached offline document if install ran, else the
  /// inline one.
  fn offline_page(&self) -> Result<StoredResponse> {
    let key = request_key(OFFLINE_PAGE_PATH);
    match self.store.lookup(Tier::Static, &key)? {
      Some(cached) => Ok(cached),
      None => Ok(strategy::offline_page_response()),
    }
  }
}
