//! Device response verification (ISO/IEC 18013-5 §9.3).

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ciborium::Value;
use tracing::instrument;

use super::claims;
use super::model::{tag24, to_vec, DeviceAuth, DeviceResponse, Document, MobileSecurityObject};
use super::transcript::{self, SessionTranscript};
use crate::adapters::trust_list::TrustStoreBuilder;
use crate::adapters::x509::X509ChainValidator;
use crate::crypto::certificate::{is_time_valid, Certificate};
use crate::crypto::cose::{
  derive_ephemeral_mac_key, digest, mac0_verify_message, sign1_verify_message, EMAC_KEY_INFO,
};
use crate::domain::credential_verifier::CredentialVerifier;
use crate::domain::error::{EngineError, EngineResult};
use crate::domain::types::{BuiltTrustStore, MdocVerifyOptions, SessionBinding, TrustMode};
use crate::domain::verify::{MatchedTrustedEntity, VerificationResult};

fn failed(reason: impl Into<String>) -> EngineError {
  EngineError::VerificationFailed(reason.into())
}

/// Namespace to element identifiers, the request a response is checked against.
pub type ItemsRequest = BTreeMap<String, Vec<String>>;

/// Rebuilds the request from what the device returned.
pub fn expected_request(document: &Document) -> ItemsRequest {
  document
    .issuer_signed
    .name_spaces
    .iter()
    .map(|(ns, items)| {
      (ns.clone(), items.iter().map(|i| i.item.element_identifier.clone()).collect())
    })
    .collect()
}

/// `#6.24(bstr .cbor ["DeviceAuthentication", SessionTranscript, DocType, DeviceNameSpacesBytes])`
pub fn device_authentication_bytes(
  transcript: &SessionTranscript,
  doc_type: &str,
  device_name_spaces_bytes: &Value,
) -> EngineResult<Vec<u8>> {
  let device_auth = Value::Array(vec![
    Value::Text("DeviceAuthentication".into()),
    transcript.value().clone(),
    Value::Text(doc_type.to_string()),
    device_name_spaces_bytes.clone(),
  ]);
  to_vec(&tag24(&device_auth)?)
}

pub struct MdocVerifier {
  trust_store: Option<Arc<TrustStoreBuilder>>,
}

impl MdocVerifier {
  pub fn new(trust_store: Arc<TrustStoreBuilder>) -> Self {
    Self { trust_store: Some(trust_store) }
  }

  /// Verifier for `TrustMode::SkipValidation` callers only.
  pub fn without_trust_store() -> Self {
    Self { trust_store: None }
  }

  async fn resolve_store(&self, options: &MdocVerifyOptions) -> EngineResult<Option<Arc<BuiltTrustStore>>> {
    match &options.trust_mode {
      TrustMode::SkipValidation => {
        tracing::warn!("issuer trust validation skipped; any self-consistent issuer is accepted");
        Ok(None)
      }
      TrustMode::RequireTrust(source) => {
        let builder = self
          .trust_store
          .as_ref()
          .ok_or_else(|| EngineError::Config("trust store builder not configured".into()))?;
        builder.get_trust_store(source).await.map(Some)
      }
    }
  }

  fn verify_document(
    &self,
    document: &Document,
    transcript: &SessionTranscript,
    store: Option<&BuiltTrustStore>,
    options: &MdocVerifyOptions,
  ) -> EngineResult<Option<MatchedTrustedEntity>> {
    let now = options.evaluation_time();
    let issuer_signed = &document.issuer_signed;

    // Issuer authentication
    let x5chain = issuer_signed.x5chain();
    let leaf_der = x5chain.first().ok_or_else(|| failed("issuerAuth carries no x5chain"))?;
    let leaf = Certificate::from_der(leaf_der)?;
    if !is_time_valid(&leaf, now) {
      return Err(failed("document signer certificate is not valid now"));
    }
    let leaf_key = leaf.public_key()?;
    if !sign1_verify_message(&issuer_signed.issuer_auth, None, &leaf_key)? {
      return Err(failed("issuer signature does not verify"));
    }

    let matched = match store {
      Some(store) => {
        let validator = X509ChainValidator::new(&options.limits);
        let matched = validator.validate(&x5chain, store, &options.policy, now)?;
        Some(matched.ok_or_else(|| failed("issuer chain matches no trusted entity"))?)
      }
      None => None,
    };

    let mso = issuer_signed.mobile_security_object()?;
    check_mso(&mso, document, now)?;
    check_value_digests(&mso, document)?;
    check_request_coverage(&mso, document, &expected_request(document))?;

    // Device authentication
    let device_signed = document
      .device_signed
      .as_ref()
      .ok_or_else(|| failed("deviceSigned missing"))?;
    let device_key = mso.device_key.to_public_key()?;
    let auth_bytes =
      device_authentication_bytes(transcript, &document.doc_type, &device_signed.name_spaces_bytes)?;
    let authentic = match &device_signed.device_auth {
      DeviceAuth::Signature(sig) => sign1_verify_message(sig, Some(auth_bytes.as_slice()), &device_key)?,
      DeviceAuth::Mac(mac) => {
        let reader_key = options
          .reader_private_key
          .as_ref()
          .ok_or_else(|| failed("deviceMac requires the reader's ephemeral private key"))?;
        let mac_key = derive_ephemeral_mac_key(reader_key, &device_key, transcript.bytes(), EMAC_KEY_INFO)?;
        mac0_verify_message(mac, &auth_bytes, &mac_key)?
      }
    };
    if !authentic {
      return Err(failed("device authentication does not verify"));
    }
    Ok(matched)
  }
}

fn check_mso(mso: &MobileSecurityObject, document: &Document, now: DateTime<Utc>) -> EngineResult<()> {
  if mso.doc_type != document.doc_type {
    return Err(failed(format!(
      "MSO docType '{}' does not match document '{}'",
      mso.doc_type, document.doc_type
    )));
  }
  if !mso.validity_info.contains(now) {
    return Err(failed("MSO is outside its validity period"));
  }
  Ok(())
}

fn check_value_digests(mso: &MobileSecurityObject, document: &Document) -> EngineResult<()> {
  for (ns, items) in &document.issuer_signed.name_spaces {
    let digests = mso
      .value_digests
      .get(ns)
      .ok_or_else(|| failed(format!("no value digests for namespace '{ns}'")))?;
    for item in items {
      let expected = digests.get(&item.item.digest_id).ok_or_else(|| {
        failed(format!("no digest for '{}/{}'", ns, item.item.element_identifier))
      })?;
      if digest(mso.digest_algorithm, &item.encoded)? != *expected {
        return Err(failed(format!(
          "digest mismatch for '{}/{}'",
          ns, item.item.element_identifier
        )));
      }
    }
  }
  Ok(())
}

/// Every requested element must be present as an issuer-signed item whose
/// digest id the MSO commits to.
fn check_request_coverage(mso: &MobileSecurityObject, document: &Document, request: &ItemsRequest) -> EngineResult<()> {
  for (ns, elements) in request {
    let items = document.issuer_signed.name_spaces.get(ns);
    let digests = mso.value_digests.get(ns);
    for element in elements {
      let covered = items
        .into_iter()
        .flatten()
        .filter(|i| i.item.element_identifier == *element)
        .any(|i| digests.is_some_and(|d| d.contains_key(&i.item.digest_id)));
      if !covered {
        return Err(failed(format!("requested element '{ns}/{element}' is not issuer-signed")));
      }
    }
  }
  Ok(())
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
  payload
    .downcast_ref::<&str>()
    .map(|s| s.to_string())
    .or_else(|| payload.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "unknown panic".into())
}

#[async_trait]
impl CredentialVerifier for MdocVerifier {
  type Options = MdocVerifyOptions;

  #[instrument(skip_all, fields(response_mode = ?binding.response_mode))]
  async fn verify(
    &self,
    presentation: &str,
    binding: &SessionBinding,
    options: &MdocVerifyOptions,
  ) -> EngineResult<VerificationResult> {
    let presentation = presentation.trim();
    if presentation.len() > options.limits.max_device_response_size {
      return Err(EngineError::Decode("device response exceeds size limit".into()));
    }
    let bytes = URL_SAFE_NO_PAD.decode(presentation.trim_end_matches('='))?;
    let response = DeviceResponse::from_slice(&bytes)?;
    if response.documents.len() > 1 {
      tracing::debug!(documents = response.documents.len(), "verifying first document only");
    }
    let document = response.documents.into_iter().next().ok_or(EngineError::DocumentNotFound)?;
    let doc_type = document.doc_type.clone();
    let claims = claims::extract(&document.issuer_signed);

    let store = self.resolve_store(options).await?;
    if let Some(store) = &store {
      if store.certificate_count() == 0 {
        tracing::warn!(%doc_type, "trust store holds no certificates");
        return Ok(VerificationResult::rejected_with_claims(claims, doc_type, "trust store is empty"));
      }
      if !options.allow_stale_trust_list && store.is_stale(options.evaluation_time()) {
        tracing::warn!(%doc_type, next_update = ?store.next_update, "trust store is past NextUpdate");
        return Ok(VerificationResult::rejected_with_claims(claims, doc_type, "trust list is stale"));
      }
    }

    let transcript = transcript::build(binding)?;

    let outcome = catch_unwind(AssertUnwindSafe(|| {
      self.verify_document(&document, &transcript, store.as_deref(), options)
    }))
    .unwrap_or_else(|p| Err(EngineError::Panic(panic_message(p))));

    match outcome {
      Ok(matched) => {
        tracing::debug!(%doc_type, trusted = matched.is_some(), "device response verified");
        Ok(VerificationResult::verified(claims, doc_type, matched))
      }
      Err(e) => {
        tracing::warn!(%doc_type, kind = ?e.kind(), error = %e, "device response rejected");
        Ok(VerificationResult::rejected(doc_type, e.to_string()))
      }
    }
  }
}
