//! ISO/IEC 18013-5 mdoc presentations delivered over OpenID4VP.

pub mod claims;
pub mod model;
pub mod transcript;
pub mod verifier;

pub use transcript::SessionTranscript;
pub use verifier::MdocVerifier;
