//! LoTE trust lists: retrieval, signature gate, parsing and the cached store.

pub mod fetcher;
pub mod parser;
pub mod signature;
pub mod store;
pub mod url_validation;

#[cfg(feature = "http")]
pub use fetcher::HttpFetcher;
pub use fetcher::DocumentFetcher;
pub use parser::{decode_document, filter_by_service_types, parse, ParsedTrustList};
pub use signature::{AcceptUnverified, JwsSignatureVerifier, RejectUnverified, TrustListSignatureVerifier};
pub use store::TrustStoreBuilder;
