//! Network access for the worker.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use super::policy::WorkerRequest;

/// Snapshot of a response: enough to replay it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// 2xx
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Whether to attach the user's credentials to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
  Omit,
  Include,
}

#[async_trait]
pub trait Network: Send + Sync {
  /// Perform the request. Errors mean no response arrived at all;
  /// HTTP error statuses are returned as responses.
  async fn fetch(&self, request: &WorkerRequest, credentials: Credentials) -> Result<HttpResponse>;
}

/// reqwest-backed network.
#[derive(Clone)]
pub struct HttpNetwork {
  http: reqwest::Client,
  bearer: Option<String>,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    Ok(Self { http, bearer: None })
  }

  /// Token attached to credentialed requests.
  pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
    self.bearer = Some(token.into());
    self
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &WorkerRequest, credentials: Credentials) -> Result<HttpResponse> {
    let mut builder = self
      .http
      .request(request.method.clone(), request.url.clone())
      .headers(request.headers.clone());

    if let (Credentials::Include, Some(token)) = (credentials, self.bearer.as_deref()) {
      builder = builder.bearer_auth(token);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Fetch {} failed: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    Ok(HttpResponse {
      status,
      headers,
      body,
    })
  }
}
