use serde::{Deserialize, Serialize};

/// A single usable secret bound to one profile key slot.
///
/// A bare API key for
/// the five key-based providers, and a Google service account for Vertex AI
/// (whose "key" is really a signed JWT minted from service-account fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Credential {
    ApiKey(ApiKeyCredential),
    ServiceAccount(ServiceAccountCredential),
}

impl Credential {
    /// The literal string substituted into the single-key profile clone the
    /// Dispatcher hands to an adapter. For a service
    /// account this is the cached access token, not the private key.
    pub fn as_wire_secret(&self) -> &str {
        match self {
            Credential::ApiKey(key) => &key.api_key,
            Credential::ServiceAccount(sa) => &sa.access_token,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyCredential {
    pub api_key: String,
}

impl From<String> for Credential {
    fn from(api_key: String) -> Self {
        Credential::ApiKey(ApiKeyCredential { api_key })
    }
}

/// Google service account JSON fields used to mint Vertex AI access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountCredential {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_at: i64,
}
