//! Trust list document signature checks.
//!
//! A fetched document is not trusted until a [`TrustListSignatureVerifier`]
//! accepts it. [`RejectUnverified`] is the default and refuses everything.

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Public};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Verifier};
use serde::Deserialize;

use crate::crypto::cose::{sig_alg_for_key, sign1_verify};
use crate::crypto::key_source::KeySource;
use crate::domain::error::{EngineError, EngineResult};
use crate::domain::types::{SigAlg, TrustListRef};

pub trait TrustListSignatureVerifier: Send + Sync {
  /// `Ok(())` only when `document` is authentic for `list`.
  fn verify(&self, list: &TrustListRef, document: &str) -> EngineResult<()>;
}

/// Refuses every document.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectUnverified;

impl TrustListSignatureVerifier for RejectUnverified {
  fn verify(&self, list: &TrustListRef, _document: &str) -> EngineResult<()> {
    Err(EngineError::TrustListSignature(format!(
      "no signature verifier configured for {}",
      list.url
    )))
  }
}

/// Accepts documents without checking them. Development only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptUnverified;

impl TrustListSignatureVerifier for AcceptUnverified {
  fn verify(&self, list: &TrustListRef, _document: &str) -> EngineResult<()> {
    tracing::warn!(url = %list.url, "trust list accepted without signature verification");
    Ok(())
  }
}

/// Verifies a compact JWS against the list's `verifier_key`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JwsSignatureVerifier;

#[derive(Deserialize)]
struct JwsHeader {
  alg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JwsAlg {
  Ec(SigAlg),
  Rs256,
  Ps256,
}

impl JwsAlg {
  fn parse(alg: &str) -> Option<Self> {
    match alg {
      "ES256" => Some(JwsAlg::Ec(SigAlg::Es256)),
      "ES384" => Some(JwsAlg::Ec(SigAlg::Es384)),
      "ES512" => Some(JwsAlg::Ec(SigAlg::Es512)),
      "RS256" => Some(JwsAlg::Rs256),
      "PS256" => Some(JwsAlg::Ps256),
      _ => None,
    }
  }
}

fn rejected(list: &TrustListRef, reason: impl std::fmt::Display) -> EngineError {
  EngineError::TrustListSignature(format!("{}: {reason}", list.url))
}

impl TrustListSignatureVerifier for JwsSignatureVerifier {
  fn verify(&self, list: &TrustListRef, document: &str) -> EngineResult<()> {
    let key_ref = list
      .verifier_key
      .as_deref()
      .ok_or_else(|| rejected(list, "no verifier key configured"))?;
    let key = KeySource::from_str(key_ref)
      .map_err(|e| rejected(list, e))?
      .resolve()?;

    let mut parts = document.trim().split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
      (parts.next(), parts.next(), parts.next(), parts.next())
    else {
      return Err(rejected(list, "document is not a compact JWS"));
    };

    let header_json = URL_SAFE_NO_PAD
      .decode(header_b64)
      .map_err(|e| rejected(list, format!("header: {e}")))?;
    let header: JwsHeader =
      serde_json::from_slice(&header_json).map_err(|e| rejected(list, format!("header: {e}")))?;
    let alg = JwsAlg::parse(&header.alg)
      .ok_or_else(|| rejected(list, format!("unsupported alg '{}'", header.alg)))?;
    let signature = URL_SAFE_NO_PAD
      .decode(sig_b64)
      .map_err(|e| rejected(list, format!("signature: {e}")))?;
    let signing_input = format!("{header_b64}.{payload_b64}");

    let valid = verify_jws(alg, &key, signing_input.as_bytes(), &signature)
      .map_err(|e| rejected(list, e))?;
    if !valid {
      return Err(rejected(list, "signature does not verify"));
    }
    tracing::debug!(url = %list.url, alg = %header.alg, "trust list signature verified");
    Ok(())
  }
}

fn verify_jws(alg: JwsAlg, key: &PKey<Public>, input: &[u8], signature: &[u8]) -> EngineResult<bool> {
  match alg {
    JwsAlg::Ec(expected) => {
      if key.id() != Id::EC || sig_alg_for_key(key)? != expected {
        return Ok(false);
      }
      sign1_verify(key, Some(signature), input)
    }
    JwsAlg::Rs256 | JwsAlg::Ps256 => {
      if key.id() != Id::RSA {
        return Ok(false);
      }
      let mut verifier = Verifier::new(MessageDigest::sha256(), key)?;
      if alg == JwsAlg::Ps256 {
        verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
        verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
        verifier.set_rsa_mgf1_md(MessageDigest::sha256())?;
      }
      verifier.update(input)?;
      Ok(verifier.verify(signature).unwrap_or(false))
    }
  }
}
