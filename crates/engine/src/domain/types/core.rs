use serde::{Deserialize, Serialize};

/// Signature algorithms accepted for issuer and device COSE signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigAlg {
    Es256,
    Es384,
    Es512,
}

impl SigAlg {
    pub fn to_cose(self) -> coset::iana::Algorithm {
        match self {
            SigAlg::Es256 => coset::iana::Algorithm::ES256,
            SigAlg::Es384 => coset::iana::Algorithm::ES384,
            SigAlg::Es512 => coset::iana::Algorithm::ES512,
        }
    }

    pub fn from_cose(alg: coset::iana::Algorithm) -> Option<Self> {
        match alg {
            coset::iana::Algorithm::ES256 => Some(SigAlg::Es256),
            coset::iana::Algorithm::ES384 => Some(SigAlg::Es384),
            coset::iana::Algorithm::ES512 => Some(SigAlg::Es512),
            _ => None,
        }
    }
}

/// How a non-CA trusted certificate is compared against a built path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinnedCertMode {
    /// The presented leaf must be the pinned certificate.
    #[default]
    Leaf,
    /// The path terminus must be the pinned certificate.
    PathEnd,
}

/// Which rule produced a trust match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    #[serde(rename = "ca")]
    Ca,
    #[serde(rename = "leaf-pinned")]
    LeafPinned,
    #[serde(rename = "pathEnd-pinned")]
    PathEndPinned,
}
