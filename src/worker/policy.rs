//! Request classification for the service worker.
//!
//! `classify` is a pure function of method, URL, mode and headers; the
//! worker looks the result up and runs the matching strategy.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Method;
use url::Url;

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level page navigation
  Navigate,
  /// Anything else (fetch/XHR, subresources)
  Default,
}

/// A request as seen by the worker.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub headers: HeaderMap,
}

impl WorkerRequest {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::Default,
      headers: HeaderMap::new(),
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_accept(mut self, accept: &'static str) -> Self {
    self.headers.insert(ACCEPT, HeaderValue::from_static(accept));
    self
  }

  /// Key under which the response is cached.
  pub fn cache_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    url.into()
  }

  fn accepts_html(&self) -> bool {
    self
      .headers
      .get_all(ACCEPT)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .any(|v| v.contains("text/html"))
  }
}

/// Strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
  /// Not intercepted; goes straight to the network
  PassThrough,
  /// Immutable build asset: cache-first
  StaticAsset,
  /// Page load: stale-while-revalidate with offline document fallback
  Navigation,
  /// Any other GET: cache-first with write-through
  Other,
}

/// Pick the strategy for a request. First match wins.
pub fn classify(request: &WorkerRequest, static_prefix: &str) -> Policy {
  if request.method != Method::GET {
    return Policy::PassThrough;
  }

  if request.url.path().starts_with(static_prefix) {
    return Policy::StaticAsset;
  }

  if request.mode == RequestMode::Navigate || request.accepts_html() {
    return Policy::Navigation;
  }

  Policy::Other
}

#[cfg(test)]
mod tests {
  use super::*;

  const PREFIX: &str = "/_next/static/";

  fn url(path: &str) -> Url {
    Url::parse("https://app.example.com")
      .unwrap()
      .join(path)
      .unwrap()
  }

  #[test]
  fn test_non_get_passes_through() {
    let request = WorkerRequest::navigate(url("/tasks")).with_method(Method::POST);
    assert_eq!(classify(&request, PREFIX), Policy::PassThrough);

    let request = WorkerRequest::get(url("/_next/static/app.js")).with_method(Method::PUT);
    assert_eq!(classify(&request, PREFIX), Policy::PassThrough);
  }

  #[test]
  fn test_static_prefix_wins_over_navigation() {
    let request = WorkerRequest::navigate(url("/_next/static/chunks/main.js"));
    assert_eq!(classify(&request, PREFIX), Policy::StaticAsset);
  }

  #[test]
  fn test_navigation_by_mode_or_accept() {
    assert_eq!(
      classify(&WorkerRequest::navigate(url("/dashboard")), PREFIX),
      Policy::Navigation
    );

    let request =
      WorkerRequest::get(url("/tasks/1")).with_accept("text/html,application/xhtml+xml");
    assert_eq!(classify(&request, PREFIX), Policy::Navigation);
  }

  #[test]
  fn test_everything_else() {
    let request = WorkerRequest::get(url("/api/data")).with_accept("application/json");
    assert_eq!(classify(&request, PREFIX), Policy::Other);
    assert_eq!(
      classify(&WorkerRequest::get(url("/icon.svg")), PREFIX),
      Policy::Other
    );
  }

  #[test]
  fn test_cache_key_drops_fragment() {
    let request = WorkerRequest::get(url("/tasks/1?tab=notes#top"));
    assert_eq!(
      request.cache_key(),
      "https://app.example.com/tasks/1?tab=notes"
    );
  }
}
