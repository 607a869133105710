// crates/engine/src/domain/verify.rs
use serde::Serialize;
use serde_json::{Map, Value};

use crate::crypto::certificate::Certificate;
use super::types::{MatchMode, TrustedEntity};

/// Result of matching a certification path against trusted entities.
/// Produced fresh for every validation call and never cached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedTrustedEntity {
    pub entity: TrustedEntity,
    pub issuance_cert: Certificate,
    pub issuance_thumbprint: String,
    pub issuance_is_ca: bool,
    pub match_mode: MatchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_cert: Option<Certificate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_thumbprint: Option<String>,
}

/// Namespace-keyed claims: `{ namespace: { element_identifier: value } }`.
pub type Claims = Map<String, Value>;

/// Verdict of a presentation verification.
#[derive(Debug, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,
    pub claims: Claims,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    /// Trust match when the issuer chain was checked against a store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_entity: Option<MatchedTrustedEntity>,

    /// Why `verified` is false, for diagnostics only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl VerificationResult {
    pub fn verified(claims: Claims, doc_type: String, matched_entity: Option<MatchedTrustedEntity>) -> Self {
        Self {
            verified: true,
            claims,
            doc_type: Some(doc_type),
            matched_entity,
            failure_reason: None,
        }
    }

    /// Rejection that still reports what was extracted.
    pub fn rejected_with_claims(claims: Claims, doc_type: String, reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            claims,
            doc_type: Some(doc_type),
            matched_entity: None,
            failure_reason: Some(reason.into()),
        }
    }

    /// Rejection after a failed signature stage: claims are withheld.
    pub fn rejected(doc_type: String, reason: impl Into<String>) -> Self {
        Self::rejected_with_claims(Claims::new(), doc_type, reason)
    }
}
