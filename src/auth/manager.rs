use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::device::DeviceAuthorizationDriver;
use super::store::TokenStore;
use super::types::{BrowserLaunch, ClientInformation, ClientRegistration, ExpiryState};
use crate::error::{AuthError, Result};

/// Token lifecycle manager
/// Decides whether a stored record is reused, its token renewed, or the
/// client registered again, and keeps the token store current
pub struct TokenLifecycleManager {
    /// Device authorization handshake
    driver: DeviceAuthorizationDriver,

    /// Records keyed by configuration name
    store: Arc<dyn TokenStore>,
}

impl TokenLifecycleManager {
    pub fn new(driver: DeviceAuthorizationDriver, store: Arc<dyn TokenStore>) -> Self {
        Self { driver, store }
    }

    /// Return a usable access token record for `config_name`.
    ///
    /// No network calls are made while the stored token and registration
    /// are both valid. An expired token reuses the registration with a new
    /// device code; an expired registration (or one for another start URL)
    /// registers a new client.
    pub async fn ensure_valid_credentials(
        &self,
        config_name: &str,
        start_url: &str,
        cancel: &CancellationToken,
    ) -> Result<ClientInformation> {
        let Some(existing) = self.store.load(config_name) else {
            tracing::info!("No cached token for '{}', registering a new client", config_name);
            return self.register(config_name, start_url, cancel).await;
        };

        if existing.start_url != start_url {
            tracing::info!(
                "Start URL for '{}' changed from {} to {}, registering a new client",
                config_name,
                existing.start_url,
                start_url
            );
            return self.register(config_name, start_url, cancel).await;
        }

        match existing.expiry_state(self.driver.clock().now()) {
            ExpiryState::ClientExpired => {
                tracing::info!("Client registration for '{}' expired", config_name);
                self.register(config_name, start_url, cancel).await
            }
            ExpiryState::AccessTokenExpired => {
                tracing::info!("AccessToken expired. Start retrieving a new AccessToken.");
                let registration = existing.registration();
                self.authorize(config_name, start_url, registration, cancel)
                    .await
            }
            ExpiryState::Valid => {
                tracing::debug!(
                    "Reusing cached token for '{}' (expires {})",
                    config_name,
                    existing.access_token_expires_at.to_rfc3339()
                );
                Ok(existing)
            }
        }
    }

    /// New client, new device code, new token
    async fn register(
        &self,
        config_name: &str,
        start_url: &str,
        cancel: &CancellationToken,
    ) -> Result<ClientInformation> {
        let registration = self.driver.register_client(start_url).await?;
        self.authorize(config_name, start_url, registration, cancel)
            .await
    }

    /// Device authorization and polling with an existing client, then persist
    async fn authorize(
        &self,
        config_name: &str,
        start_url: &str,
        registration: ClientRegistration,
        cancel: &CancellationToken,
    ) -> Result<ClientInformation> {
        let authorization = self
            .driver
            .start_device_authorization(&registration, start_url)
            .await?;

        if let BrowserLaunch::Failed(ref reason) = authorization.browser {
            tracing::warn!(
                "Could not open a browser ({}). Please open the URL manually: {}",
                reason,
                authorization.verification_uri_complete
            );
        }

        let issued = self
            .driver
            .poll_for_token(&registration, &authorization.device_code, cancel)
            .await?;

        let record = ClientInformation {
            access_token_expires_at: issued.expires_at,
            access_token: issued.access_token,
            client_id: registration.client_id,
            client_secret: registration.client_secret,
            client_secret_expires_at: registration.client_secret_expires_at,
            device_code: authorization.device_code,
            verification_uri_complete: authorization.verification_uri_complete,
            start_url: start_url.to_string(),
        };

        if let Err(source) = self.store.save(config_name, &record) {
            tracing::error!("Token cache update for '{}' failed: {:#}", config_name, source);
            return Err(AuthError::Persistence {
                config_name: config_name.to_string(),
                record: Box::new(record),
                source,
            });
        }

        Ok(record)
    }
}
