use std::time::Duration;

use async_trait::async_trait;

use crate::domain::error::{EngineError, EngineResult};

#[cfg(feature = "http")]
use crate::domain::types::FetchPolicy;

/// Retrieves a trust list document as text. Implementations must honor
/// `timeout` as a hard deadline and must not retry.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
  async fn fetch(&self, url: &str, timeout: Duration) -> EngineResult<String>;
}

pub(crate) fn fetch_error(url: &str, reason: impl Into<String>) -> EngineError {
  EngineError::TrustListFetch { url: url.to_string(), reason: reason.into() }
}

/// reqwest-backed fetcher with URL policy checks and a body size cap.
#[cfg(feature = "http")]
pub struct HttpFetcher {
  client: reqwest::Client,
  policy: FetchPolicy,
}

/// Resolver that refuses names pointing at private or loopback addresses.
/// Checked at connect time, so the address reqwest dials is the one vetted.
#[cfg(feature = "http")]
struct PublicOnlyResolver;

#[cfg(feature = "http")]
impl reqwest::dns::Resolve for PublicOnlyResolver {
  fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
    Box::pin(async move {
      let addrs = super::url_validation::resolve_public(name.as_str()).await?;
      let addrs: reqwest::dns::Addrs = Box::new(addrs.into_iter());
      Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
    })
  }
}

#[cfg(feature = "http")]
impl HttpFetcher {
  pub fn new(policy: FetchPolicy) -> EngineResult<Self> {
    let mut builder = reqwest::Client::builder()
      .user_agent(format!("vc-trust-engine/{}", env!("CARGO_PKG_VERSION")))
      // Redirects and proxies would bypass the host checks.
      .redirect(reqwest::redirect::Policy::none())
      .no_proxy();
    if !policy.allow_private_hosts {
      builder = builder.dns_resolver(std::sync::Arc::new(PublicOnlyResolver));
    }
    let client = builder
      .build()
      .map_err(|e| EngineError::Config(format!("http client: {e}")))?;
    Ok(Self { client, policy })
  }

  pub fn policy(&self) -> &FetchPolicy {
    &self.policy
  }

  async fn get(&self, url: &str) -> EngineResult<String> {
    let validated = super::url_validation::validate_trust_list_url(url, &self.policy)?;
    let mut resp = self
      .client
      .get(validated)
      .send()
      .await
      .map_err(|e| fetch_error(url, format!("request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(fetch_error(url, format!("unexpected status {}", status.as_u16())));
    }

    let limit = self.policy.max_document_size;
    if resp.content_length().is_some_and(|len| len as usize > limit) {
      return Err(fetch_error(url, "document exceeds size limit"));
    }
    let mut body = Vec::new();
    while let Some(chunk) = resp
      .chunk()
      .await
      .map_err(|e| fetch_error(url, format!("reading body: {e}")))?
    {
      if body.len() + chunk.len() > limit {
        return Err(fetch_error(url, "document exceeds size limit"));
      }
      body.extend_from_slice(&chunk);
    }
    String::from_utf8(body).map_err(|_| fetch_error(url, "document is not valid UTF-8"))
  }
}

#[cfg(feature = "http")]
#[async_trait]
impl DocumentFetcher for HttpFetcher {
  async fn fetch(&self, url: &str, timeout: Duration) -> EngineResult<String> {
    tracing::debug!(url, timeout_ms = timeout.as_millis() as u64, "fetching trust list");
    match tokio::time::timeout(timeout, self.get(url)).await {
      Ok(result) => result,
      Err(_) => Err(fetch_error(url, format!("timed out after {} ms", timeout.as_millis()))),
    }
  }
}
