// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth client name announced at registration
pub const CLIENT_NAME: &str = "awsx";

/// OAuth client type announced at registration
pub const CLIENT_TYPE: &str = "public";

/// Grant type used while polling for the access token
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Access tokens issued by SSO OIDC live 8 hours; keep a 5 minute margin
pub fn access_token_lifetime() -> Duration {
    Duration::hours(8) - Duration::minutes(5)
}

/// Registration, device authorization and token for one named configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInformation {
    pub access_token_expires_at: DateTime<Utc>,
    pub access_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub client_secret_expires_at: DateTime<Utc>,
    pub device_code: String,
    pub verification_uri_complete: String,
    pub start_url: String,
}

/// What a stored record is still good for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryState {
    /// Access token and registration are both usable
    Valid,
    /// Registration still valid, token must be renewed with a new device code
    AccessTokenExpired,
    /// Registration is void, a new client must be registered
    ClientExpired,
}

impl ClientInformation {
    /// Classify the record at `now`. An expired client secret supersedes
    /// the access token state.
    pub fn expiry_state(&self, now: DateTime<Utc>) -> ExpiryState {
        if now >= self.client_secret_expires_at {
            ExpiryState::ClientExpired
        } else if now >= self.access_token_expires_at {
            ExpiryState::AccessTokenExpired
        } else {
            ExpiryState::Valid
        }
    }

    pub fn registration(&self) -> ClientRegistration {
        ClientRegistration {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            client_secret_expires_at: self.client_secret_expires_at,
        }
    }
}

/// Client credentials issued by RegisterClient
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub client_secret_expires_at: DateTime<Utc>,
}

/// In-flight device authorization
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: Option<String>,
    pub verification_uri_complete: String,
    pub browser: BrowserLaunch,
}

/// Result of trying to open the verification URL locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserLaunch {
    Opened,
    /// Browser launching is disabled
    Skipped,
    /// Non-fatal, the user can open the printed URL by hand
    Failed(String),
}

/// Access token returned by a successful poll
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(any(test, feature = "test-utils"))]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// === SSO OIDC wire types ===

/// RegisterClient request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClientRequest<'a> {
    pub client_name: &'a str,
    pub client_type: &'a str,
}

/// RegisterClient response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClientResponse {
    pub client_id: String,
    pub client_secret: String,
    /// Unix seconds
    pub client_secret_expires_at: i64,
}

/// StartDeviceAuthorization request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDeviceAuthorizationRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub start_url: &'a str,
}

/// StartDeviceAuthorization response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: Option<String>,
    pub verification_uri: Option<String>,
    pub verification_uri_complete: String,
    pub expires_in: Option<i64>,
    pub interval: Option<i64>,
}

/// CreateToken request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant_type: &'a str,
    pub device_code: &'a str,
}

/// CreateToken response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
}

/// OAuth style error body
#[derive(Debug, Deserialize)]
pub struct OidcErrorBody {
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub message: Option<String>,
}
