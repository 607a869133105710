use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::crypto::certificate::{is_time_valid, Certificate};
use crate::domain::error::{EngineError, EngineResult};

/// Builds a certification path from `leaf` upwards.
///
/// Candidates are drawn from anchors first, then the presented chain, then
/// `extra_intermediates`. Building stops at an anchor or at a self-issued
/// certificate. A candidate must both be named as issuer and verify the
/// current certificate's signature.
pub fn build_path(
  leaf: &Certificate,
  presented_chain: &[Certificate],
  anchors: &[Certificate],
  extra_intermediates: &[Certificate],
  max_chain_length: usize,
) -> EngineResult<Vec<Certificate>> {
  let anchor_prints: HashSet<&str> = anchors.iter().map(Certificate::thumbprint).collect();
  let pool: Vec<&Certificate> = anchors
    .iter()
    .chain(presented_chain)
    .chain(extra_intermediates)
    .collect();

  let mut path = vec![leaf.clone()];
  loop {
    let current = &path[path.len() - 1];
    if anchor_prints.contains(current.thumbprint()) || current.is_self_issued() {
      return Ok(path);
    }
    if path.len() >= max_chain_length {
      return Err(EngineError::ChainBuild(format!(
        "path exceeds {max_chain_length} certificates"
      )));
    }

    let issuer = pool
      .iter()
      .find(|c| current.names_issuer(c) && !path.contains(c) && current.is_signed_by(c))
      .map(|c| (*c).clone());
    match issuer {
      Some(issuer) => path.push(issuer),
      None => {
        return Err(EngineError::ChainBuild(format!(
          "no issuer found for '{}'",
          current.subject()
        )))
      }
    }
  }
}

/// Checks every link of `path` and every validity window at `now`.
pub fn verify_path(path: &[Certificate], now: DateTime<Utc>) -> EngineResult<()> {
  if path.is_empty() {
    return Err(EngineError::ChainBuild("empty certification path".into()));
  }
  for (i, cert) in path.iter().enumerate() {
    if !is_time_valid(cert, now) {
      return Err(EngineError::ChainVerification(format!(
        "'{}' is outside its validity period",
        cert.subject()
      )));
    }
    match path.get(i + 1) {
      Some(issuer) if !cert.is_signed_by(issuer) => {
        return Err(EngineError::ChainVerification(format!(
          "'{}' is not signed by '{}'",
          cert.subject(),
          issuer.subject()
        )));
      }
      None if cert.is_self_issued() && !cert.is_signed_by(cert) => {
        return Err(EngineError::ChainVerification(format!(
          "self-issued '{}' does not verify under its own key",
          cert.subject()
        )));
      }
      _ => {}
    }
  }
  Ok(())
}

/// The path must end in one of `anchors`.
pub fn check_anchor(path: &[Certificate], anchors: &[Certificate]) -> EngineResult<()> {
  let terminus = path
    .last()
    .ok_or_else(|| EngineError::ChainBuild("empty certification path".into()))?;
  if anchors.iter().any(|a| a.thumbprint() == terminus.thumbprint()) {
    Ok(())
  } else {
    Err(EngineError::UntrustedRoot(format!(
      "path ends at '{}' which is not a trust anchor",
      terminus.subject()
    )))
  }
}
