use std::time::Duration;

use chrono::{DateTime, Utc};
use openssl::pkey::{PKey, Private};

use super::core::PinnedCertMode;
use super::trust::TrustListSource;

/// Centralized defaults for the engine.
/// All opinionated defaults should be defined here for consistency.
pub struct EngineDefaults;

impl EngineDefaults {
    // Trust list retrieval
    pub const FETCH_TIMEOUT: Duration = Duration::from_millis(4_000);
    pub const CACHE_TTL: Duration = Duration::from_millis(300_000); // 5 minutes
    pub const SERVE_STALE_ON_ERROR: bool = false; // Surface rebuild failures
    pub const ALLOW_INSECURE_HTTP: bool = false; // Secure default: HTTPS only
    pub const ALLOW_PRIVATE_HOSTS: bool = false; // No loopback / private ranges

    // Chain policy
    pub const REQUIRE_X5C: bool = true;
    pub const PINNED_CERT_MODE: PinnedCertMode = PinnedCertMode::Leaf;

    // Verification
    pub const ALLOW_STALE_TRUST_LIST: bool = false; // Past NextUpdate is untrusted
}

/// Configurable per-call limits to bound memory and CPU on hostile input.
#[derive(Debug, Clone, Copy)]
pub struct LimitsConfig {
    /// Max size of a base64url device response string.
    pub max_device_response_size: usize,
    /// Max size of a fetched trust list document.
    pub max_trust_list_size: usize,
    /// Max number of certificates in a built certification path.
    pub max_chain_length: usize,
}

impl LimitsConfig {
    /// Opinionated production defaults.
    pub fn defaults() -> Self {
        Self {
            max_device_response_size: 4 * 1024 * 1024, // 4 MB
            max_trust_list_size: 16 * 1024 * 1024,     // 16 MB
            max_chain_length: 8,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Network policy for the default HTTP fetcher.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub allow_insecure_http: bool,
    pub allow_private_hosts: bool,
    pub max_document_size: usize,
}

impl FetchPolicy {
    pub fn secure_default() -> Self {
        Self {
            allow_insecure_http: EngineDefaults::ALLOW_INSECURE_HTTP,
            allow_private_hosts: EngineDefaults::ALLOW_PRIVATE_HOSTS,
            max_document_size: LimitsConfig::defaults().max_trust_list_size,
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::secure_default()
    }
}

/// Trust store cache behavior.
#[derive(Debug, Clone, Copy)]
pub struct TrustStoreConfig {
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    /// Return the previous store (with a warning) when a rebuild fails.
    pub serve_stale_on_error: bool,
}

impl TrustStoreConfig {
    pub fn secure_default() -> Self {
        Self {
            cache_ttl: EngineDefaults::CACHE_TTL,
            fetch_timeout: EngineDefaults::FETCH_TIMEOUT,
            serve_stale_on_error: EngineDefaults::SERVE_STALE_ON_ERROR,
        }
    }
}

impl Default for TrustStoreConfig {
    fn default() -> Self {
        Self::secure_default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RevocationPolicy {
    /// Reject matches whose entity has no revocation-service certificate.
    pub require_revocation_cert: bool,
}

/// Chain-validation semantics.
#[derive(Debug, Clone, Copy)]
pub struct VerifyPolicy {
    pub require_x5c: bool,
    pub pinned_cert_mode: PinnedCertMode,
    pub revocation: Option<RevocationPolicy>,
}

impl VerifyPolicy {
    pub fn secure_default() -> Self {
        Self {
            require_x5c: EngineDefaults::REQUIRE_X5C,
            pinned_cert_mode: EngineDefaults::PINNED_CERT_MODE,
            revocation: None,
        }
    }
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self::secure_default()
    }
}

/// Whether the issuer certificate chain is checked against a trust store.
#[derive(Debug, Clone)]
pub enum TrustMode {
    /// Signatures are verified but no certificate matching happens.
    /// Any issuer with a self-consistent signature is accepted.
    SkipValidation,
    /// The issuer chain must match an entity of the given trust lists.
    RequireTrust(TrustListSource),
}

impl TrustMode {
    /// Maps an optional source the way loosely-typed callers expect:
    /// absent or empty means `SkipValidation`.
    pub fn from_source(source: Option<TrustListSource>) -> Self {
        match source {
            Some(s) if !s.is_empty() => TrustMode::RequireTrust(s),
            _ => TrustMode::SkipValidation,
        }
    }
}

/// Options for a single mdoc verification call.
#[derive(Debug, Clone)]
pub struct MdocVerifyOptions {
    pub trust_mode: TrustMode,
    pub policy: VerifyPolicy,
    /// Reader ephemeral key, needed only for `deviceMac` authentication.
    pub reader_private_key: Option<PKey<Private>>,
    pub allow_stale_trust_list: bool,
    pub limits: LimitsConfig,
    /// Evaluation time for certificate and MSO validity. Defaults to now.
    pub now: Option<DateTime<Utc>>,
}

impl MdocVerifyOptions {
    /// Secure opinionated defaults; caller supplies the trust source.
    pub fn secure_default(source: TrustListSource) -> Self {
        Self::with_trust_mode(TrustMode::RequireTrust(source))
    }

    pub fn with_trust_mode(trust_mode: TrustMode) -> Self {
        Self {
            trust_mode,
            policy: VerifyPolicy::secure_default(),
            reader_private_key: None,
            allow_stale_trust_list: EngineDefaults::ALLOW_STALE_TRUST_LIST,
            limits: LimitsConfig::defaults(),
            now: None,
        }
    }

    pub fn evaluation_time(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}
