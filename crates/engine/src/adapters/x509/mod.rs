//! X.509 chain validation against a built trust store.

pub mod matching;
pub mod path;

use chrono::{DateTime, Utc};

pub use matching::path_matches_trusted_entities;
pub use path::{build_path, check_anchor, verify_path};

use crate::crypto::certificate::{parse_certificate, Certificate};
use crate::domain::error::{EngineError, EngineResult};
use crate::domain::types::{BuiltTrustStore, LimitsConfig, VerifyPolicy};
use crate::domain::verify::MatchedTrustedEntity;

#[derive(Debug, Clone)]
pub struct X509ChainValidator {
  max_chain_length: usize,
  extra_intermediates: Vec<Certificate>,
}

impl Default for X509ChainValidator {
  fn default() -> Self {
    Self::new(&LimitsConfig::defaults())
  }
}

impl X509ChainValidator {
  pub fn new(limits: &LimitsConfig) -> Self {
    Self { max_chain_length: limits.max_chain_length, extra_intermediates: Vec::new() }
  }

  /// Intermediates known out of band, used when the presented chain is short.
  pub fn with_intermediates(mut self, intermediates: Vec<Certificate>) -> Self {
    self.extra_intermediates = intermediates;
    self
  }

  /// Issuance certificates of the store, parsed. Revocation-service
  /// certificates never terminate a path. Unparseable values are skipped.
  pub fn anchors(store: &BuiltTrustStore) -> Vec<Certificate> {
    store
      .entities
      .iter()
      .flat_map(|e| e.issuance_services().map(move |s| (e, s)))
      .filter_map(|(entity, service)| match parse_certificate(&service.cert_value) {
        Ok(cert) => Some(cert),
        Err(e) => {
          tracing::warn!(entity = %entity.entity_id, error = %e, "skipping unparseable trust anchor");
          None
        }
      })
      .collect()
  }

  /// Validates a DER `x5chain` (leaf first) and matches it against `store`.
  ///
  /// Chain build, link verification and anchor failures are errors.
  /// `Ok(None)` means the chain is sound but no trusted entity claims it.
  pub fn validate(
    &self,
    x5chain_der: &[Vec<u8>],
    store: &BuiltTrustStore,
    policy: &VerifyPolicy,
    now: DateTime<Utc>,
  ) -> EngineResult<Option<MatchedTrustedEntity>> {
    let Some((leaf_der, rest)) = x5chain_der.split_first() else {
      if policy.require_x5c {
        return Err(EngineError::ChainBuild("x5chain is empty".into()));
      }
      return Ok(None);
    };
    let leaf = Certificate::from_der(leaf_der)?;
    let presented = rest
      .iter()
      .map(|der| Certificate::from_der(der))
      .collect::<EngineResult<Vec<_>>>()?;

    let anchors = Self::anchors(store);
    let path = build_path(&leaf, &presented, &anchors, &self.extra_intermediates, self.max_chain_length)?;
    verify_path(&path, now)?;
    check_anchor(&path, &anchors)?;

    let matched = path_matches_trusted_entities(&path, &store.entities, policy.pinned_cert_mode);
    match (matched, policy.revocation) {
      (Some(m), Some(rev)) if rev.require_revocation_cert && m.revocation_cert.is_none() => {
        tracing::warn!(entity = %m.entity.entity_id, "matched entity has no revocation certificate");
        Ok(None)
      }
      (matched, _) => Ok(matched),
    }
  }
}
