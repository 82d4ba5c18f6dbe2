// Device authorization grant driver

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::oidc::OidcApi;
use super::types::{
    access_token_lifetime, BrowserLaunch, Clock, ClientRegistration, DeviceAuthorization,
    IssuedToken,
};
use crate::error::{AuthError, CancelReason, OidcError, Result, Stage};

/// Wait between two CreateToken attempts while approval is pending
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Opens the verification URL for the user
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Local default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        webbrowser::open(url)
    }
}

/// Poll loop tuning
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub poll_interval: Duration,
    /// `None` polls until approval, a non-pending error, or cancellation
    pub poll_timeout: Option<Duration>,
    pub open_browser: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: None,
            open_browser: true,
        }
    }
}

/// Runs the OAuth2 device authorization handshake against SSO OIDC
pub struct DeviceAuthorizationDriver {
    api: Arc<dyn OidcApi>,
    opener: Arc<dyn UrlOpener>,
    clock: Arc<dyn Clock>,
    options: DriverOptions,
}

impl DeviceAuthorizationDriver {
    pub fn new(
        api: Arc<dyn OidcApi>,
        opener: Arc<dyn UrlOpener>,
        clock: Arc<dyn Clock>,
        options: DriverOptions,
    ) -> Self {
        Self {
            api,
            opener,
            clock,
            options,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Register a new public OAuth client. Never retried here.
    pub async fn register_client(&self, start_url: &str) -> Result<ClientRegistration> {
        tracing::debug!("Registering OIDC client for {}", start_url);

        let response = self.api.register_client().await.map_err(|e| match e {
            OidcError::Api { code, message } => {
                AuthError::Registration(format!("{}: {}", code, message))
            }
            other => AuthError::Registration(other.to_string()),
        })?;

        let client_secret_expires_at = Utc
            .timestamp_opt(response.client_secret_expires_at, 0)
            .single()
            .ok_or_else(|| {
                AuthError::Registration(format!(
                    "invalid clientSecretExpiresAt: {}",
                    response.client_secret_expires_at
                ))
            })?;

        tracing::info!(
            "Registered OIDC client {}..., valid until {}",
            response.client_id.chars().take(8).collect::<String>(),
            client_secret_expires_at.to_rfc3339()
        );

        Ok(ClientRegistration {
            client_id: response.client_id,
            client_secret: response.client_secret,
            client_secret_expires_at,
        })
    }

    /// Start a device authorization and surface the verification URL
    pub async fn start_device_authorization(
        &self,
        client: &ClientRegistration,
        start_url: &str,
    ) -> Result<DeviceAuthorization> {
        let response = self
            .api
            .start_device_authorization(&client.client_id, &client.client_secret, start_url)
            .await
            .map_err(|e| AuthError::from_oidc(Stage::StartDeviceAuthorization, e))?;

        tracing::info!(
            "Please verify your client request: {}",
            response.verification_uri_complete
        );
        if let Some(ref user_code) = response.user_code {
            tracing::info!("Verification code: {}", user_code);
        }

        let browser = if self.options.open_browser {
            match self.opener.open(&response.verification_uri_complete) {
                Ok(()) => BrowserLaunch::Opened,
                Err(e) => BrowserLaunch::Failed(e.to_string()),
            }
        } else {
            BrowserLaunch::Skipped
        };

        Ok(DeviceAuthorization {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri_complete: response.verification_uri_complete,
            browser,
        })
    }

    /// Poll CreateToken until the user approves the device.
    ///
    /// Pending authorization sleeps `poll_interval` and retries; any other
    /// error ends the loop. Expiry is computed from the clock at the moment
    /// the token arrives.
    pub async fn poll_for_token(
        &self,
        client: &ClientRegistration,
        device_code: &str,
        cancel: &CancellationToken,
    ) -> Result<IssuedToken> {
        match self.options.poll_timeout {
            Some(limit) => tokio::time::timeout(limit, self.poll_loop(client, device_code, cancel))
                .await
                .unwrap_or(Err(AuthError::Cancelled(CancelReason::Deadline(limit)))),
            None => self.poll_loop(client, device_code, cancel).await,
        }
    }

    async fn poll_loop(
        &self,
        client: &ClientRegistration,
        device_code: &str,
        cancel: &CancellationToken,
    ) -> Result<IssuedToken> {
        loop {
            if cancel.is_cancelled() {
                return Err(AuthError::Cancelled(CancelReason::Signal));
            }

            let result = self
                .api
                .create_token(&client.client_id, &client.client_secret, device_code)
                .await;

            match result {
                Ok(response) => {
                    let issued_at = self.clock.now();
                    let expires_at = issued_at + access_token_lifetime();
                    tracing::info!("Access token issued, expires: {}", expires_at.to_rfc3339());
                    return Ok(IssuedToken {
                        access_token: response.access_token,
                        expires_at,
                    });
                }
                Err(OidcError::AuthorizationPending) => {
                    tracing::info!("Still waiting for authorization...");
                    tokio::select! {
                        _ = tokio::time::sleep(self.options.poll_interval) => {}
                        _ = cancel.cancelled() => {
                            return Err(AuthError::Cancelled(CancelReason::Signal));
                        }
                    }
                }
                Err(OidcError::Api { code, message }) => {
                    tracing::warn!("API error: {}", code);
                    return Err(AuthError::Api {
                        stage: Stage::CreateToken,
                        code,
                        message,
                    });
                }
                Err(e) => return Err(AuthError::from_oidc(Stage::CreateToken, e)),
            }
        }
    }
}
