// crates/engine/src/domain/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("configuration: {0}")]
  Config(String),

  #[error("certificate parse: {0}")]
  CertificateParse(String),

  #[error("trust list fetch failed for {url}: {reason}")]
  TrustListFetch { url: String, reason: String },

  #[error("trust list parse: {0}")]
  TrustListParse(String),

  #[error("trust list signature rejected: {0}")]
  TrustListSignature(String),

  #[error("chain build: {0}")]
  ChainBuild(String),

  #[error("chain verification: {0}")]
  ChainVerification(String),

  #[error("untrusted root: {0}")]
  UntrustedRoot(String),

  #[error("COSE_Mac0 has no tag")]
  MissingTag,

  #[error("COSE_Sign1 has no signature")]
  MissingSignature,

  #[error("decode: {0}")]
  Decode(String),

  #[error("device response contains no document")]
  DocumentNotFound,

  #[error(transparent)]
  Crypto(#[from] openssl::error::ErrorStack),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error("feature not enabled: {0}")]
  Feature(&'static str),

  #[error("verification failed: {0}")]
  VerificationFailed(String),

  // Raised when a panic is caught at the verify boundary.
  #[error("internal panic: {0}")]
  Panic(String),
}

/// Machine-checkable error category, stable across message wording changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Config,
  CertificateParse,
  TrustListFetch,
  TrustListParse,
  TrustListSignature,
  ChainBuild,
  ChainVerification,
  UntrustedRoot,
  MissingTag,
  MissingSignature,
  Decode,
  DocumentNotFound,
  Crypto,
  Json,
  Feature,
  VerificationFailed,
  Panic,
}

impl EngineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      EngineError::Config(_) => ErrorKind::Config,
      EngineError::CertificateParse(_) => ErrorKind::CertificateParse,
      EngineError::TrustListFetch { .. } => ErrorKind::TrustListFetch,
      EngineError::TrustListParse(_) => ErrorKind::TrustListParse,
      EngineError::TrustListSignature(_) => ErrorKind::TrustListSignature,
      EngineError::ChainBuild(_) => ErrorKind::ChainBuild,
      EngineError::ChainVerification(_) => ErrorKind::ChainVerification,
      EngineError::UntrustedRoot(_) => ErrorKind::UntrustedRoot,
      EngineError::MissingTag => ErrorKind::MissingTag,
      EngineError::MissingSignature => ErrorKind::MissingSignature,
      EngineError::Decode(_) => ErrorKind::Decode,
      EngineError::DocumentNotFound => ErrorKind::DocumentNotFound,
      EngineError::Crypto(_) => ErrorKind::Crypto,
      EngineError::Json(_) => ErrorKind::Json,
      EngineError::Feature(_) => ErrorKind::Feature,
      EngineError::VerificationFailed(_) => ErrorKind::VerificationFailed,
      EngineError::Panic(_) => ErrorKind::Panic,
    }
  }

  /// A copy with the same kind and message, for handing one failure to
  /// several waiters.
  pub(crate) fn replay(&self) -> Self {
    match self {
      EngineError::Config(m) => EngineError::Config(m.clone()),
      EngineError::CertificateParse(m) => EngineError::CertificateParse(m.clone()),
      EngineError::TrustListFetch { url, reason } => {
        EngineError::TrustListFetch { url: url.clone(), reason: reason.clone() }
      }
      EngineError::TrustListParse(m) => EngineError::TrustListParse(m.clone()),
      EngineError::TrustListSignature(m) => EngineError::TrustListSignature(m.clone()),
      EngineError::ChainBuild(m) => EngineError::ChainBuild(m.clone()),
      EngineError::ChainVerification(m) => EngineError::ChainVerification(m.clone()),
      EngineError::UntrustedRoot(m) => EngineError::UntrustedRoot(m.clone()),
      EngineError::MissingTag => EngineError::MissingTag,
      EngineError::MissingSignature => EngineError::MissingSignature,
      EngineError::Decode(m) => EngineError::Decode(m.clone()),
      EngineError::DocumentNotFound => EngineError::DocumentNotFound,
      EngineError::Crypto(e) => EngineError::Crypto(e.clone()),
      EngineError::Json(e) => EngineError::Json(<serde_json::Error as serde::de::Error>::custom(e)),
      EngineError::Feature(f) => EngineError::Feature(f),
      EngineError::VerificationFailed(m) => EngineError::VerificationFailed(m.clone()),
      EngineError::Panic(m) => EngineError::Panic(m.clone()),
    }
  }
}

impl From<base64::DecodeError> for EngineError {
  fn from(e: base64::DecodeError) -> Self {
    EngineError::Decode(format!("base64: {e}"))
  }
}

impl From<coset::CoseError> for EngineError {
  fn from(e: coset::CoseError) -> Self {
    EngineError::Decode(format!("cose: {e}"))
  }
}

impl From<ciborium::de::Error<std::io::Error>> for EngineError {
  fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
    EngineError::Decode(format!("cbor: {e}"))
  }
}

impl From<ciborium::ser::Error<std::io::Error>> for EngineError {
  fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
    EngineError::Decode(format!("cbor encode: {e}"))
  }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_is_stable_for_struct_variants() {
    let e = EngineError::TrustListFetch { url: "https://x".into(), reason: "timeout".into() };
    assert_eq!(e.kind(), ErrorKind::TrustListFetch);
    assert!(e.to_string().contains("https://x"));
  }
}
