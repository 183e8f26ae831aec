//! Serve strategies and their synthesized fallback responses.
//!
//! The fallback bodies are constants so degraded output is deterministic:
//! the same offline JSON, offline page, and placeholder image every time.

use crate::http::StoredResponse;

/// The fetch/serve algorithm bound to a resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Network first, cache fallback, synthesized last resort
  NetworkFirst,
  /// Cache hit short-circuits; total failure propagates
  CacheFirst,
  /// Cache hit short-circuits; total failure yields a placeholder image
  CacheFirstWithPlaceholder,
}

/// Path of the offline document prefetched at install and served as the
/// page fallback.
pub const OFFLINE_PAGE_PATH: &str = "/offline.html";

/// Final API fallback body.
pub const OFFLINE_API_BODY: &str =
  r#"{"error":"Offline","message":"You are offline. Please check your connection."}"#;

/// Inline page fallback, used when even the cached offline document is
/// missing.
pub const OFFLINE_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Offline</title>
</head>
<body>
  <h1>You are offline</h1>
  <p>This page is not available right now. Check your connection and try again.</p>
  <button onclick="window.location.reload()">Retry</button>
</body>
</html>
"#;

/// Inline placeholder served when an image is neither cached nor
/// fetchable.
pub const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300" viewBox="0 0 400 300">
  <rect width="400" height="300" fill="#e2e2e2"/>
  <text x="200" y="150" font-family="sans-serif" font-size="18" fill="#6b6b6b" text-anchor="middle" dominant-baseline="middle">Image unavailable offline</text>
</svg>
"##;

/// `{"error":"Offline", ...}` with status 503.
pub fn offline_api_response() -> StoredResponse {
  StoredResponse::new(
    503,
    Some("application/json".to_string()),
    OFFLINE_API_BODY.as_bytes().to_vec(),
  )
}

/// The inline offline document.
pub fn offline_page_response() -> StoredResponse {
  StoredResponse::new(
    200,
    Some("text/html".to_string()),
    OFFLINE_PAGE_HTML.as_bytes().to_vec(),
  )
}

/// The inline vector-image placeholder, status 200.
pub fn placeholder_image_response() -> StoredResponse {
  StoredResponse::new(
    200,
    Some("image/svg+xml".to_string()),
    PLACEHOLDER_SVG.as_bytes().to_vec(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_offline_api_body_is_valid_json() {
    let value: serde_json::Value = serde_json::from_str(OFFLINE_API_BODY).unwrap();
    assert_eq!(value["error"], "Offline");
    assert_eq!(
      value["message"],
      "You are offline. Please check your connection."
    );
  }

  #[test]
  fn test_offline_api_response_shape() {
    let response = offline_api_response();
    assert_eq!(response.status, 503);
    assert_eq!(response.content_type.as_deref(), Some("application/json"));
  }

  #[test]
  fn test_placeholder_is_svg_with_ok_status() {
    let response = placeholder_image_response();
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type.as_deref(), Some("image/svg+xml"));
    assert!(response.body_text().starts_with("<svg"));
  }
}
