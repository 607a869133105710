//! Certificate utilities: PEM / base64-DER parsing, SHA-256 thumbprints,
//! BasicConstraints inspection and validity-window checks.

use std::cmp::Ordering;
use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Public};
use openssl::x509::X509;
use serde::{Serialize, Serializer};
use x509_parser::prelude::*;

use crate::domain::error::{EngineError, EngineResult};

const PEM_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// How a certificate value was supplied. Resolved once at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertEncoding {
    Pem,
    Der,
}

/// A parsed X.509 certificate with the facts path building needs.
#[derive(Clone)]
pub struct Certificate {
    x509: X509,
    der: Vec<u8>,
    encoding: CertEncoding,
    thumbprint: String,
    subject: Vec<u8>,
    issuer: Vec<u8>,
    subject_display: String,
    is_ca: bool,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> EngineResult<Self> {
        Self::from_der_with_encoding(der, CertEncoding::Der)
    }

    fn from_der_with_encoding(der: &[u8], encoding: CertEncoding) -> EngineResult<Self> {
        let x509 = X509::from_der(der)
            .map_err(|e| EngineError::CertificateParse(format!("invalid DER: {e}")))?;
        let (_, parsed) = parse_x509_certificate(der)
            .map_err(|e| EngineError::CertificateParse(format!("invalid certificate structure: {e}")))?;

        // Basic constraints; absent extension means not a CA
        let mut is_ca = false;
        for ext in parsed.extensions() {
            if let ParsedExtension::BasicConstraints(bc) = ext.parsed_extension() {
                is_ca = bc.ca;
            }
        }

        let digest = openssl::hash::hash(MessageDigest::sha256(), der)?;
        Ok(Self {
            der: der.to_vec(),
            encoding,
            thumbprint: hex::encode(digest),
            subject: parsed.subject().as_raw().to_vec(),
            issuer: parsed.issuer().as_raw().to_vec(),
            subject_display: parsed.subject().to_string(),
            is_ca,
            x509,
        })
    }

    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn encoding(&self) -> CertEncoding {
        self.encoding
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    pub fn subject(&self) -> &str {
        &self.subject_display
    }

    pub fn public_key(&self) -> EngineResult<PKey<Public>> {
        Ok(self.x509.public_key()?)
    }

    /// Subject and issuer names are byte-identical.
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// `issuer` names this certificate's issuer.
    pub fn names_issuer(&self, issuer: &Certificate) -> bool {
        self.issuer == issuer.subject
    }

    /// Signature on `self` verifies under `issuer`'s public key.
    pub fn is_signed_by(&self, issuer: &Certificate) -> bool {
        match issuer.public_key() {
            Ok(key) => self.x509.verify(&key).unwrap_or(false),
            Err(_) => false,
        }
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.thumbprint == other.thumbprint
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject_display)
            .field("thumbprint", &self.thumbprint)
            .field("is_ca", &self.is_ca)
            .finish()
    }
}

impl Serialize for Certificate {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(&self.der))
    }
}

/// Parse a certificate from PEM or base64 DER (standard or url-safe alphabet).
pub fn parse_certificate(value: &str) -> EngineResult<Certificate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::CertificateParse("empty certificate value".into()));
    }

    if trimmed.contains(PEM_MARKER) {
        let x509 = X509::from_pem(trimmed.as_bytes())
            .map_err(|e| EngineError::CertificateParse(format!("invalid PEM: {e}")))?;
        let der = x509.to_der()?;
        return Certificate::from_der_with_encoding(&der, CertEncoding::Pem);
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let der = STANDARD
        .decode(&compact)
        .or_else(|_| URL_SAFE_NO_PAD.decode(compact.trim_end_matches('=')))
        .map_err(|e| EngineError::CertificateParse(format!("invalid base64: {e}")))?;
    Certificate::from_der_with_encoding(&der, CertEncoding::Der)
}

/// Parse every certificate in a concatenated PEM bundle.
pub fn parse_certificate_bundle(pem: &str) -> EngineResult<Vec<Certificate>> {
    let stack = X509::stack_from_pem(pem.as_bytes())
        .map_err(|e| EngineError::CertificateParse(format!("invalid PEM bundle: {e}")))?;
    stack
        .iter()
        .map(|x| Certificate::from_der_with_encoding(&x.to_der()?, CertEncoding::Pem))
        .collect()
}

/// SHA-256 over DER, lower hex, no separators.
pub fn thumbprint(cert: &Certificate) -> String {
    cert.thumbprint.clone()
}

pub fn is_ca_cert(cert: &Certificate) -> bool {
    cert.is_ca
}

/// `not_before <= now <= not_after`. Errors evaluate to invalid.
pub fn is_time_valid(cert: &Certificate, now: DateTime<Utc>) -> bool {
    let Ok(now) = Asn1Time::from_unix(now.timestamp()) else {
        return false;
    };
    let after_start = matches!(
        cert.x509.not_before().compare(&now),
        Ok(Ordering::Less | Ordering::Equal)
    );
    let before_end = matches!(
        cert.x509.not_after().compare(&now),
        Ok(Ordering::Greater | Ordering::Equal)
    );
    after_start && before_end
}
