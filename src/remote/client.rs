use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;

use super::endpoint::Endpoint;

/// Remote collaborator the sync engine delivers to and refreshes from.
///
/// The contract is deliberately thin: success with an optional JSON body, or
/// an error. Status codes are not classified into retryable and terminal.
pub trait Backend: Send + Sync + 'static {
  fn post(&self, endpoint: &Endpoint, body: Value) -> impl Future<Output = Result<Value>> + Send;

  fn get(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Value>> + Send;

  /// Cheap reachability check.
  fn ping(&self) -> impl Future<Output = Result<()>> + Send;
}

/// JSON-over-HTTP backend client
#[derive(Clone)]
pub struct HttpBackend {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpBackend {
  pub fn new(config: &Config) -> Result<Self> {
    let base_url = parse_base_url(&config.backend.url)?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.backend.timeout_secs))
      .user_agent(concat!("shiftsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      token: Config::get_api_token(),
    })
  }

  fn request(&self, method: Method, endpoint: &Endpoint) -> Result<RequestBuilder> {
    let url = self
      .base_url
      .join(&endpoint.path())
      .map_err(|e| eyre!("Invalid endpoint {:?}: {}", endpoint, e))?;

    let builder = self.client.request(method, url);
    Ok(match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    })
  }

  async fn send(&self, request: RequestBuilder) -> Result<Value> {
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request failed: {}", e))?;

    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response body: {}", e))?;

    if !status.is_success() {
      return Err(eyre!("HTTP {}: {}", status.as_u16(), truncate(&text, 200)));
    }

    if text.trim().is_empty() {
      return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| eyre!("Failed to parse response body: {}", e))
  }
}

impl Backend for HttpBackend {
  async fn post(&self, endpoint: &Endpoint, body: Value) -> Result<Value> {
    debug!(path = %endpoint.path(), "POST");
    let request = self.request(Method::POST, endpoint)?.json(&body);
    self.send(request).await
  }

  async fn get(&self, endpoint: &Endpoint) -> Result<Value> {
    debug!(path = %endpoint.path(), "GET");
    let request = self.request(Method::GET, endpoint)?;
    self.send(request).await
  }

  async fn ping(&self) -> Result<()> {
    let request = self.request(Method::GET, &Endpoint::Health)?;
    self.send(request).await.map(|_| ())
  }
}

/// Parse the configured base URL so relative endpoint paths join beneath it.
fn parse_base_url(raw: &str) -> Result<Url> {
  let mut url = Url::parse(raw).map_err(|e| eyre!("Invalid backend url '{}': {}", raw, e))?;
  if url.cannot_be_a_base() {
    return Err(eyre!("Backend url '{}' cannot be used as a base", raw));
  }
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  Ok(url)
}

/// Truncate a string to at most `max_len` characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}
