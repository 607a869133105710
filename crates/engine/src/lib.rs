// crates/engine/src/lib.rs

//! Public facade for the credential trust engine.
//! Exposes a stable API and re-exports types for consumers.

pub mod adapters;
pub mod crypto;
pub mod domain;

use std::sync::Arc;

use adapters::common::run_on_current_thread;
use domain::error::EngineResult;

/// Verify a base64url device response. Trust lists are resolved through
/// `trust_store` when `options.trust_mode` requires it.
pub async fn verify_mdoc(
  trust_store: Arc<TrustStoreBuilder>,
  device_response: &str,
  binding: &SessionBinding,
  options: &MdocVerifyOptions,
) -> EngineResult<VerificationResult> {
  MdocVerifier::new(trust_store)
    .verify(device_response, binding, options)
    .await
}

/// Blocking variant of [`verify_mdoc`] for synchronous callers.
pub fn verify_mdoc_blocking(
  trust_store: Arc<TrustStoreBuilder>,
  device_response: &str,
  binding: &SessionBinding,
  options: &MdocVerifyOptions,
) -> EngineResult<VerificationResult> {
  run_on_current_thread(verify_mdoc(trust_store, device_response, binding, options))
}

/// Resolve (and cache) the trust store for `source`.
pub async fn get_trust_store(
  trust_store: &TrustStoreBuilder,
  source: &TrustListSource,
) -> EngineResult<Arc<BuiltTrustStore>> {
  trust_store.get_trust_store(source).await
}

// Re-exports for convenience
pub use adapters::mdoc::MdocVerifier;
#[cfg(feature = "http")]
pub use adapters::trust_list::HttpFetcher;
pub use adapters::trust_list::{
  AcceptUnverified, DocumentFetcher, JwsSignatureVerifier, RejectUnverified, TrustListSignatureVerifier,
  TrustStoreBuilder,
};
pub use adapters::x509::X509ChainValidator;
pub use crypto::certificate::{parse_certificate, Certificate};
pub use domain::credential_verifier::CredentialVerifier;
pub use domain::error::{EngineError, ErrorKind};
pub use domain::types::{
  BuiltTrustStore, EngineDefaults, FetchPolicy, LimitsConfig, MatchMode, MdocVerifyOptions, PinnedCertMode,
  ResponseMode, RevocationPolicy, ServiceTypeIdentifier, SessionBinding, TrustListRef, TrustListSource,
  TrustMode, TrustStoreConfig, TrustedEntity, TrustedService, VerifyPolicy,
};
pub use domain::verify::{MatchedTrustedEntity, VerificationResult};
