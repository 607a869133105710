use std::net::{IpAddr, SocketAddr};

use url::{Host, Url};

use crate::domain::error::{EngineError, EngineResult};
use crate::domain::types::FetchPolicy;

fn reject(url: &str, reason: impl Into<String>) -> EngineError {
  EngineError::TrustListFetch { url: url.to_string(), reason: reason.into() }
}

fn is_blocked(ip: IpAddr) -> bool {
  match ip {
    IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_broadcast() || v4.is_documentation() || v4.is_unspecified(),
    IpAddr::V6(v6) => v6.is_loopback() || v6.is_unique_local() || v6.is_unicast_link_local() || v6.is_unspecified() || v6.is_multicast(),
  }
}

/// Checks a trust list URL against the fetch policy before any request is made.
///
/// Only literal hosts are checked here. Domain names are checked when they
/// are resolved for the connection, see [`resolve_public`].
pub fn validate_trust_list_url(url_str: &str, policy: &FetchPolicy) -> EngineResult<Url> {
  let url = Url::parse(url_str).map_err(|e| reject(url_str, format!("invalid URL: {e}")))?;
  match url.scheme() {
    "https" => {}
    "http" if policy.allow_insecure_http => {}
    "http" => return Err(reject(url_str, "HTTP URLs are not allowed")),
    other => return Err(reject(url_str, format!("unsupported URL scheme '{other}'"))),
  }
  let host = url.host().ok_or_else(|| reject(url_str, "URL missing host"))?;
  if policy.allow_private_hosts {
    return Ok(url);
  }

  let literal = match host {
    Host::Ipv4(a) => Some(IpAddr::V4(a)),
    Host::Ipv6(a) => Some(IpAddr::V6(a)),
    Host::Domain(d) if d.eq_ignore_ascii_case("localhost") => {
      return Err(reject(url_str, "URL host is not allowed (loopback)"));
    }
    Host::Domain(_) => None,
  };
  match literal {
    Some(ip) if is_blocked(ip) => Err(reject(url_str, "URL host is not allowed (private/link-local/loopback)")),
    _ => Ok(url),
  }
}

/// Resolves `host` and refuses it when any address is private, loopback or
/// link-local.
pub async fn resolve_public(host: &str) -> EngineResult<Vec<SocketAddr>> {
  let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
    .await
    .map_err(|e| reject(host, format!("DNS resolution failed: {e}")))?
    .collect();
  if addrs.is_empty() {
    return Err(reject(host, "DNS resolution returned no addresses"));
  }
  if addrs.iter().map(SocketAddr::ip).any(is_blocked) {
    return Err(reject(host, "URL resolves to a disallowed private/loopback address"));
  }
  Ok(addrs)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn https_public_literal_is_accepted() {
    assert!(validate_trust_list_url("https://8.8.8.8/lote.jwt", &FetchPolicy::secure_default()).is_ok());
  }

  #[test]
  fn plain_http_needs_opt_in() {
    let mut policy = FetchPolicy::secure_default();
    policy.allow_private_hosts = true;
    assert!(validate_trust_list_url("http://127.0.0.1/lote", &policy).is_err());
    policy.allow_insecure_http = true;
    assert!(validate_trust_list_url("http://127.0.0.1/lote", &policy).is_ok());
  }

  #[test]
  fn private_and_loopback_hosts_are_blocked() {
    let policy = FetchPolicy::secure_default();
    for url in ["https://127.0.0.1/x", "https://10.1.2.3/x", "https://[::1]/x", "https://localhost/x", "https://169.254.1.1/x"] {
      let err = validate_trust_list_url(url, &policy).unwrap_err();
      assert!(matches!(err, EngineError::TrustListFetch { .. }), "{url}");
    }
  }

  #[test]
  fn other_schemes_are_rejected() {
    assert!(validate_trust_list_url("file:///etc/passwd", &FetchPolicy::secure_default()).is_err());
    assert!(validate_trust_list_url("not a url", &FetchPolicy::secure_default()).is_err());
  }

  #[tokio::test]
  async fn names_resolving_to_loopback_are_refused() {
    let err = resolve_public("localhost").await.unwrap_err();
    assert!(matches!(err, EngineError::TrustListFetch { .. }));
    assert!(err.to_string().contains("disallowed"));
  }

  #[test]
  fn domain_names_are_left_to_the_resolver() {
    let url = validate_trust_list_url("https://lote.invalid/list.jwt", &FetchPolicy::secure_default()).unwrap();
    assert_eq!(url.host_str(), Some("lote.invalid"));
  }
}
