//! Request classification.
//!
//! Every intercepted GET maps to exactly one resource class, which decides
//! the cache tier and serve strategy used downstream. Non-GET requests are
//! never handled by this layer.

use crate::cache::Tier;
use crate::http::Request;
use crate::strategy::Strategy;

/// The category a GET request is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
  /// API responses (`/api/*`)
  Api,
  /// Immutable shell assets (`/static/*`, scripts, styles, fonts)
  Static,
  /// Images (`/images/*` or image file extensions)
  Image,
  /// Everything else: navigations and documents
  Page,
}

/// Extensions served as immutable shell assets.
const STATIC_EXTENSIONS: &[&str] = &["js", "css", "woff", "woff2"];

/// Extensions classified as images outside `/static/`.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg"];

impl ResourceClass {
  /// Cache tier backing this class.
  pub fn tier(&self) -> Tier {
    match self {
      ResourceClass::Api => Tier::Api,
      ResourceClass::Static => Tier::Static,
      ResourceClass::Image | ResourceClass::Page => Tier::Dynamic,
    }
  }

  /// Serve strategy bound to this class.
  pub fn strategy(&self) -> Strategy {
    match self {
      ResourceClass::Api | ResourceClass::Page => Strategy::NetworkFirst,
      ResourceClass::Static => Strategy::CacheFirst,
      ResourceClass::Image => Strategy::CacheFirstWithPlaceholder,
    }
  }
}

/// Classify a request. `None` means pass-through: the request bypasses the
/// whole layer untouched.
///
/// First match wins; the mapping is total over GET requests.
pub fn classify(request: &Request) -> Option<ResourceClass> {
  if !request.is_get() {
    return None;
  }

  let path = request.path();
  let ext = extension(path);
  let ext = ext.as_deref();

  if path.starts_with("/api/") {
    return Some(ResourceClass::Api);
  }
  if path.starts_with("/static/") {
    return Some(ResourceClass::Static);
  }
  if ext.is_some_and(|e| STATIC_EXTENSIONS.contains(&e)) {
    return Some(ResourceClass::Static);
  }
  if path.starts_with("/images/") || ext.is_some_and(|e| IMAGE_EXTENSIONS.contains(&e)) {
    return Some(ResourceClass::Image);
  }

  Some(ResourceClass::Page)
}

/// Lowercased extension of the last path segment, if any.
fn extension(path: &str) -> Option<String> {
  let segment = path.rsplit('/').next()?;
  let (_, ext) = segment.rsplit_once('.')?;
  if ext.is_empty() {
    return None;
  }
  Some(ext.to_lowercase())
}
