use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::types::{NetworkError, Request, Response, ResponseKind};
use super::Network;
use crate::config::NetworkConfig;

/// reqwest-backed network access for the worker.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(origin: &Url, config: &NetworkConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(config.timeout())
      .user_agent(config.user_agent.as_str())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin: origin.clone(),
    })
  }
}

/// Whether the response came from another URL than the one requested.
/// Fragments never reach the server, so they are ignored.
fn is_redirect(requested: &Url, final_url: &Url) -> bool {
  let mut requested = requested.clone();
  requested.set_fragment(None);
  let mut final_url = final_url.clone();
  final_url.set_fragment(None);
  requested != final_url
}

/// Same-origin responses are basic, everything else is CORS.
fn classify(origin: &Url, final_url: &Url) -> ResponseKind {
  if final_url.origin() == origin.origin() {
    ResponseKind::Basic
  } else {
    ResponseKind::Cors
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| NetworkError::new(&request.url, e.to_string()))?;

    let final_url = response.url().clone();
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
      .map_err(|e| NetworkError::new(&request.url, format!("reading body: {}", e)))?;

    Ok(Response {
      kind: classify(&self.origin, &final_url),
      redirected: is_redirect(&request.url, &final_url),
      url: final_url,
      status,
      headers,
      body: body.to_vec(),
    })
  }
}
