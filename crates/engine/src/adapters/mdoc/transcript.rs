//! OpenID4VP session transcripts for ISO mdoc presentations.
//!
//! `SessionTranscript = [null, null, Handover]` where the handover is
//!
//! - `["OpenID4VPHandover", sha256(cbor([client_id, nonce, jwk_thumbprint, response_uri]))]`
//!   for `direct_post` and `direct_post.jwt`,
//! - `["OpenID4VPDCAPIHandover", sha256(cbor([origin, nonce, jwk_thumbprint]))]`
//!   for `dc_api` and `dc_api.jwt`.
//!
//! `jwk_thumbprint` is `null` for the plain modes and mandatory for the
//! `.jwt` modes, so the response mode always reaches the transcript bytes.
//! A binding carrying fields of the other mode family is refused.

use ciborium::Value;

use super::model::{tag24, to_vec};
use crate::crypto::cose::{digest, DigestAlgorithm};
use crate::domain::error::{EngineError, EngineResult};
use crate::domain::types::{ResponseMode, SessionBinding};

const REDIRECT_HANDOVER: &str = "OpenID4VPHandover";
const DC_API_HANDOVER: &str = "OpenID4VPDCAPIHandover";

/// A built transcript in both forms the verifier needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTranscript {
  value: Value,
  bytes: Vec<u8>,
}

impl SessionTranscript {
  /// The `[null, null, Handover]` array, as embedded in `DeviceAuthentication`.
  pub fn value(&self) -> &Value {
    &self.value
  }

  /// `#6.24(bstr .cbor SessionTranscript)`, the HKDF salt input.
  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }
}

fn required<'a>(value: &'a Option<String>, name: &str, mode: ResponseMode) -> EngineResult<&'a str> {
  value
    .as_deref()
    .filter(|v| !v.is_empty())
    .ok_or_else(|| EngineError::Config(format!("{name} is required for {} session binding", mode.as_str())))
}

fn absent<T>(value: &Option<T>, name: &str, mode: ResponseMode) -> EngineResult<()> {
  match value {
    Some(_) => Err(EngineError::Config(format!("{name} is not allowed for {} session binding", mode.as_str()))),
    None => Ok(()),
  }
}

fn thumbprint(binding: &SessionBinding) -> EngineResult<Value> {
  let mode = binding.response_mode;
  if !mode.is_encrypted() {
    absent(&binding.jwk_thumbprint, "jwk_thumbprint", mode)?;
    return Ok(Value::Null);
  }
  match binding.jwk_thumbprint.as_deref() {
    Some(t) if !t.is_empty() => Ok(Value::Bytes(t.to_vec())),
    _ => Err(EngineError::Config(format!("jwk_thumbprint is required for {} session binding", mode.as_str()))),
  }
}

fn handover(binding: &SessionBinding) -> EngineResult<Value> {
  let mode = binding.response_mode;
  let thumbprint = thumbprint(binding)?;
  let nonce = Value::Text(binding.nonce.clone());

  let (name, info) = if mode.is_dc_api() {
    absent(&binding.client_id, "client_id", mode)?;
    absent(&binding.response_uri, "response_uri", mode)?;
    let origin = required(&binding.origin, "origin", mode)?;
    (DC_API_HANDOVER, vec![Value::Text(origin.into()), nonce, thumbprint])
  } else {
    absent(&binding.origin, "origin", mode)?;
    let client_id = required(&binding.client_id, "client_id", mode)?;
    let response_uri = required(&binding.response_uri, "response_uri", mode)?;
    (
      REDIRECT_HANDOVER,
      vec![Value::Text(client_id.into()), nonce, thumbprint, Value::Text(response_uri.into())],
    )
  };

  let info_hash = digest(DigestAlgorithm::Sha256, &to_vec(&Value::Array(info))?)?;
  Ok(Value::Array(vec![Value::Text(name.into()), Value::Bytes(info_hash)]))
}

pub fn build(binding: &SessionBinding) -> EngineResult<SessionTranscript> {
  if binding.nonce.is_empty() {
    return Err(EngineError::Config("nonce is required for session binding".into()));
  }
  let value = Value::Array(vec![Value::Null, Value::Null, handover(binding)?]);
  let bytes = to_vec(&tag24(&value)?)?;
  Ok(SessionTranscript { value, bytes })
}
