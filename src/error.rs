// Error handling module
// Defines the token lifecycle error taxonomy

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::auth::ClientInformation;

/// Step of the device authorization handshake an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RegisterClient,
    StartDeviceAuthorization,
    CreateToken,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::RegisterClient => "RegisterClient",
            Stage::StartDeviceAuthorization => "StartDeviceAuthorization",
            Stage::CreateToken => "CreateToken",
        };
        f.write_str(name)
    }
}

/// Why a poll loop stopped before the user approved the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// External cancellation (Ctrl+C)
    Signal,
    /// Configured poll timeout elapsed
    Deadline(Duration),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Signal => f.write_str("cancelled by user"),
            CancelReason::Deadline(after) => {
                write!(f, "no approval within {}s", after.as_secs())
            }
        }
    }
}

/// Outcome of a single SSO OIDC call, as seen on the wire
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OidcError {
    /// The user has not approved the device yet. Drives the poll loop.
    #[error("authorization pending")]
    AuthorizationPending,

    /// The service answered with an error code
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// Request never produced a usable response
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for OidcError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Errors surfaced by the token lifecycle
#[derive(Error, Debug)]
pub enum AuthError {
    /// Network failure talking to the OIDC endpoint
    #[error("{stage} failed: {message}")]
    Transport { stage: Stage, message: String },

    /// OIDC endpoint rejected the request with an error code
    #[error("{stage} rejected with {code}: {message}")]
    Api {
        stage: Stage,
        code: String,
        message: String,
    },

    /// Client registration rejected
    #[error("client registration failed: {0}")]
    Registration(String),

    /// Token store could not be written. The record obtained during this
    /// call is still attached.
    #[error("failed to persist token for '{config_name}': {source}")]
    Persistence {
        config_name: String,
        record: Box<ClientInformation>,
        #[source]
        source: anyhow::Error,
    },

    /// Poll loop stopped before approval
    #[error("device authorization {0}")]
    Cancelled(CancelReason),
}

impl AuthError {
    /// Map a wire-level failure observed during `stage`
    pub fn from_oidc(stage: Stage, error: OidcError) -> Self {
        match error {
            OidcError::Api { code, message } => AuthError::Api {
                stage,
                code,
                message,
            },
            OidcError::Transport(message) => AuthError::Transport { stage, message },
            OidcError::AuthorizationPending => AuthError::Api {
                stage,
                code: "authorization_pending".to_string(),
                message: "unexpected pending authorization".to_string(),
            },
        }
    }

    /// Freshly obtained record that could not be written to the store
    pub fn into_unpersisted_record(self) -> Option<ClientInformation> {
        match self {
            AuthError::Persistence { record, .. } => Some(*record),
            _ => None,
        }
    }
}

/// Result type alias for token lifecycle operations
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_error_messages() {
        let err = AuthError::Transport {
            stage: Stage::CreateToken,
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "CreateToken failed: connection reset");

        let err = AuthError::Api {
            stage: Stage::StartDeviceAuthorization,
            code: "InvalidClientException".to_string(),
            message: "client expired".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "StartDeviceAuthorization rejected with InvalidClientException: client expired"
        );

        let err = AuthError::Registration("throttled".to_string());
        assert_eq!(err.to_string(), "client registration failed: throttled");
    }

    #[test]
    fn test_cancelled_messages() {
        let err = AuthError::Cancelled(CancelReason::Signal);
        assert_eq!(err.to_string(), "device authorization cancelled by user");

        let err = AuthError::Cancelled(CancelReason::Deadline(Duration::from_secs(90)));
        assert_eq!(err.to_string(), "device authorization no approval within 90s");
    }

    #[test]
    fn test_from_oidc_keeps_stage() {
        let err = AuthError::from_oidc(
            Stage::CreateToken,
            OidcError::Api {
                code: "access_denied".to_string(),
                message: "denied".to_string(),
            },
        );
        match err {
            AuthError::Api { stage, code, .. } => {
                assert_eq!(stage, Stage::CreateToken);
                assert_eq!(code, "access_denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = AuthError::from_oidc(
            Stage::RegisterClient,
            OidcError::Transport("dns".to_string()),
        );
        assert!(matches!(
            err,
            AuthError::Transport {
                stage: Stage::RegisterClient,
                ..
            }
        ));
    }

    #[test]
    fn test_persistence_error_keeps_record() {
        let record = ClientInformation {
            access_token: "token".to_string(),
            access_token_expires_at: Utc::now(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            client_secret_expires_at: Utc::now(),
            device_code: "device".to_string(),
            verification_uri_complete: "https://device.sso/verify".to_string(),
            start_url: "https://example.awsapps.com/start".to_string(),
        };
        let err = AuthError::Persistence {
            config_name: "default".to_string(),
            record: Box::new(record.clone()),
            source: anyhow::anyhow!("read-only file system"),
        };
        assert_eq!(
            err.to_string(),
            "failed to persist token for 'default': read-only file system"
        );
        assert_eq!(err.into_unpersisted_record(), Some(record));

        let err = AuthError::Registration("nope".to_string());
        assert!(err.into_unpersisted_record().is_none());
    }
}
