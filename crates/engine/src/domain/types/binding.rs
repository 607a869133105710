use serde::{Deserialize, Serialize};

/// OpenID4VP response mode the presentation was delivered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMode {
    #[serde(rename = "direct_post")]
    DirectPost,
    #[serde(rename = "direct_post.jwt")]
    DirectPostJwt,
    #[serde(rename = "dc_api")]
    DcApi,
    #[serde(rename = "dc_api.jwt")]
    DcApiJwt,
}

impl ResponseMode {
    /// Browser / Digital Credentials API flows bind to the web origin
    /// instead of a response URI.
    pub fn is_dc_api(self) -> bool {
        matches!(self, ResponseMode::DcApi | ResponseMode::DcApiJwt)
    }

    /// `.jwt` modes deliver an encrypted response and bind the
    /// encryption key's thumbprint.
    pub fn is_encrypted(self) -> bool {
        matches!(self, ResponseMode::DirectPostJwt | ResponseMode::DcApiJwt)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMode::DirectPost => "direct_post",
            ResponseMode::DirectPostJwt => "direct_post.jwt",
            ResponseMode::DcApi => "dc_api",
            ResponseMode::DcApiJwt => "dc_api.jwt",
        }
    }
}

/// Parameters tying a device response to one verification session.
///
/// `client_id` and `response_uri` are required for `direct_post*` modes,
/// `origin` for `dc_api*` modes. `jwk_thumbprint` is the SHA-256 JWK
/// thumbprint of the verifier's response-encryption key; it is required for
/// the `.jwt` modes and forbidden otherwise. Fields belonging to the other
/// family of modes must be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBinding {
    pub nonce: String,
    pub response_mode: ResponseMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwk_thumbprint: Option<Vec<u8>>,
}

impl SessionBinding {
    pub fn direct_post(nonce: impl Into<String>, client_id: impl Into<String>, response_uri: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
            response_mode: ResponseMode::DirectPost,
            client_id: Some(client_id.into()),
            response_uri: Some(response_uri.into()),
            origin: None,
            jwk_thumbprint: None,
        }
    }

    pub fn dc_api(nonce: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
            response_mode: ResponseMode::DcApi,
            client_id: None,
            response_uri: None,
            origin: Some(origin.into()),
            jwk_thumbprint: None,
        }
    }
}
