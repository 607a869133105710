use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{EngineError, EngineResult};

/// A single trust-list document location plus the key material used to
/// check the document's own signature.
///
/// `verifier_key` accepts the same forms as [`crate::crypto::key_source::KeySource`]:
/// inline PEM, `local:/path/key.pem` or `env:VAR_NAME`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustListRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier_key: Option<String>,
}

impl TrustListRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), verifier_key: None }
    }

    pub fn with_verifier_key(mut self, key: impl Into<String>) -> Self {
        self.verifier_key = Some(key.into());
        self
    }
}

/// Input describing which trust lists back a verification call.
/// The order of `lotes` decides `next_update` precedence (first wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustListSource {
    pub lotes: Vec<TrustListRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_service_types: Option<Vec<ServiceTypeIdentifier>>,
}

impl TrustListSource {
    pub fn is_empty(&self) -> bool {
        self.lotes.is_empty()
    }

    /// Stable cache key: lower-hex SHA-256 of the canonical JSON form.
    pub fn cache_key(&self) -> EngineResult<String> {
        let json = serde_json::to_vec(self)?;
        let digest = openssl::hash::hash(openssl::hash::MessageDigest::sha256(), &json)?;
        Ok(hex::encode(digest))
    }
}

/// ETSI-style service type URI, e.g.
/// `http://uri.etsi.org/19602/SvcType/PID/Issuance`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTypeIdentifier(pub String);

impl ServiceTypeIdentifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_issuance(&self) -> bool {
        self.0.to_ascii_lowercase().ends_with("/issuance")
    }

    pub fn is_revocation(&self) -> bool {
        self.0.to_ascii_lowercase().ends_with("/revocation")
    }
}

impl From<&str> for ServiceTypeIdentifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedService {
    pub service_type_identifier: ServiceTypeIdentifier,
    /// PEM or base64 DER.
    pub cert_value: String,
}

/// A trust authority together with its service certificates, so an issuance
/// certificate and its paired revocation certificate resolve together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedEntity {
    pub entity_id: String,
    pub services: Vec<TrustedService>,
}

impl TrustedEntity {
    pub fn issuance_services(&self) -> impl Iterator<Item = &TrustedService> {
        self.services.iter().filter(|s| s.service_type_identifier.is_issuance())
    }

    pub fn revocation_service(&self) -> Option<&TrustedService> {
        self.services.iter().find(|s| s.service_type_identifier.is_revocation())
    }
}

/// Freshness metadata from `ListAndSchemeInformation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustListInfo {
    pub next_update: Option<String>,
    pub list_issue_date_time: Option<String>,
    pub scheme_territory: Option<String>,
}

/// Aggregated, read-only trust store snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltTrustStore {
    pub fetched_at: DateTime<Utc>,
    pub next_update: Option<String>,
    pub entities: Vec<TrustedEntity>,
}

impl BuiltTrustStore {
    pub fn certificate_count(&self) -> usize {
        self.entities.iter().map(|e| e.services.len()).sum()
    }

    /// A store whose `next_update` has passed must not be trusted.
    /// An unparseable `next_update` counts as stale.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match &self.next_update {
            None => false,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(next) => next.with_timezone(&Utc) < now,
                Err(_) => true,
            },
        }
    }
}

pub(crate) fn require_non_empty(source: &TrustListSource) -> EngineResult<()> {
    if source.is_empty() {
        return Err(EngineError::Config("trust list source has no lotes".into()));
    }
    Ok(())
}
