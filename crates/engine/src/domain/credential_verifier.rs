// crates/engine/src/domain/credential_verifier.rs

use async_trait::async_trait;

use super::error::EngineResult;
use super::types::SessionBinding;
use super::verify::VerificationResult;

/// Trait implemented by presentation formats (mdoc today, others later).
#[async_trait]
pub trait CredentialVerifier {
    type Options: Send + Sync;

    async fn verify(
        &self,
        presentation: &str,
        binding: &SessionBinding,
        options: &Self::Options,
    ) -> EngineResult<VerificationResult>;
}
