//! Where a trust list verifier key comes from.
//! Supports inline PEM, local files and env variables.

use std::path::PathBuf;
use std::str::FromStr;

use openssl::pkey::{PKey, Public};
use openssl::x509::X509;
use thiserror::Error;

use crate::domain::error::{EngineError, EngineResult};

#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("Invalid key source: expected PEM, 'local:' or 'env:'")]
    InvalidScheme,
    #[error("Missing path for 'local:' key source")]
    MissingLocalPath,
    #[error("Missing variable name for 'env:' key source")]
    MissingEnvVar,
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Failed to read key file {0}")]
    Unreadable(PathBuf),
}

impl From<KeySourceError> for EngineError {
    fn from(e: KeySourceError) -> Self {
        EngineError::Config(e.to_string())
    }
}

/// Source for a public verification key.
/// Format examples:
/// - -----BEGIN PUBLIC KEY----- ... (inline)
/// - local:/path/to/key.pem
/// - env:LOTE_SIGNER_KEY
///
/// The PEM may hold a `PUBLIC KEY` or a `CERTIFICATE`; for the latter the
/// certificate's key is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Inline(String),
    Local { path: PathBuf },
    Env { var: String },
}

impl FromStr for KeySource {
    type Err = KeySourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("-----BEGIN") {
            return Ok(KeySource::Inline(s.to_string()));
        }
        let (scheme, value) = s.split_once(':').ok_or(KeySourceError::InvalidScheme)?;
        match scheme {
            "local" if value.is_empty() => Err(KeySourceError::MissingLocalPath),
            "local" => Ok(KeySource::Local { path: PathBuf::from(value) }),
            "env" if value.is_empty() => Err(KeySourceError::MissingEnvVar),
            "env" => Ok(KeySource::Env { var: value.to_string() }),
            _ => Err(KeySourceError::InvalidScheme),
        }
    }
}

impl KeySource {
    pub fn resolve(&self) -> EngineResult<PKey<Public>> {
        let pem = match self {
            KeySource::Inline(pem) => pem.clone(),
            KeySource::Local { path } => std::fs::read_to_string(path)
                .map_err(|_| KeySourceError::Unreadable(path.clone()))?,
            KeySource::Env { var } => {
                std::env::var(var).map_err(|_| KeySourceError::EnvVarNotFound(var.clone()))?
            }
        };
        public_key_from_pem(&pem)
    }
}

fn public_key_from_pem(pem: &str) -> EngineResult<PKey<Public>> {
    if pem.contains("BEGIN CERTIFICATE") {
        let cert = X509::from_pem(pem.as_bytes())
            .map_err(|e| EngineError::Config(format!("invalid verifier certificate: {e}")))?;
        return Ok(cert.public_key()?);
    }
    PKey::public_key_from_pem(pem.as_bytes())
        .map_err(|e| EngineError::Config(format!("invalid verifier key: {e}")))
}
