// SSO OIDC client (RegisterClient, StartDeviceAuthorization, CreateToken)

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::types::{
    CreateTokenRequest, CreateTokenResponse, OidcErrorBody, RegisterClientRequest,
    RegisterClientResponse, StartDeviceAuthorizationRequest, StartDeviceAuthorizationResponse,
    CLIENT_NAME, CLIENT_TYPE, DEVICE_CODE_GRANT_TYPE,
};
use crate::error::OidcError;

/// The three SSO OIDC operations used by the device authorization grant
#[async_trait]
pub trait OidcApi: Send + Sync {
    async fn register_client(&self) -> Result<RegisterClientResponse, OidcError>;

    async fn start_device_authorization(
        &self,
        client_id: &str,
        client_secret: &str,
        start_url: &str,
    ) -> Result<StartDeviceAuthorizationResponse, OidcError>;

    async fn create_token(
        &self,
        client_id: &str,
        client_secret: &str,
        device_code: &str,
    ) -> Result<CreateTokenResponse, OidcError>;
}

/// Get AWS SSO OIDC endpoint for region
pub fn get_aws_sso_oidc_url(region: &str) -> String {
    format!("https://oidc.{}.amazonaws.com", region)
}

/// SSO OIDC over HTTPS
pub struct HttpOidcClient {
    client: Client,
    endpoint: String,
}

impl HttpOidcClient {
    /// Client for the OIDC endpoint of `sso_region`
    pub fn new(sso_region: &str) -> anyhow::Result<Self> {
        Self::with_endpoint(get_aws_sso_oidc_url(sso_region))
    }

    /// Client for an explicit endpoint (local test servers)
    pub fn with_endpoint(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, OidcError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.endpoint, path);
        tracing::debug!("SSO OIDC request: POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_error(response).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OidcError::Transport(format!("invalid response from {}: {}", path, e)))
    }
}

/// Turn a non-2xx SSO OIDC response into an `OidcError`
async fn classify_error(response: Response) -> OidcError {
    let status = response.status();
    let error_type = response
        .headers()
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(':').next().unwrap_or(v).to_string());
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<OidcErrorBody>(&text).ok();

    let code = body
        .as_ref()
        .and_then(|b| b.error.clone())
        .or_else(|| error_type.clone());

    if code.as_deref() == Some("authorization_pending")
        || error_type.as_deref() == Some("AuthorizationPendingException")
    {
        return OidcError::AuthorizationPending;
    }

    let message = body
        .and_then(|b| b.error_description.or(b.message))
        .unwrap_or_else(|| text.clone());

    match code {
        Some(code) => OidcError::Api { code, message },
        None => OidcError::Transport(format!("HTTP {}: {}", status, text)),
    }
}

#[async_trait]
impl OidcApi for HttpOidcClient {
    async fn register_client(&self) -> Result<RegisterClientResponse, OidcError> {
        self.post(
            "/client/register",
            &RegisterClientRequest {
                client_name: CLIENT_NAME,
                client_type: CLIENT_TYPE,
            },
        )
        .await
    }

    async fn start_device_authorization(
        &self,
        client_id: &str,
        client_secret: &str,
        start_url: &str,
    ) -> Result<StartDeviceAuthorizationResponse, OidcError> {
        self.post(
            "/device_authorization",
            &StartDeviceAuthorizationRequest {
                client_id,
                client_secret,
                start_url,
            },
        )
        .await
    }

    async fn create_token(
        &self,
        client_id: &str,
        client_secret: &str,
        device_code: &str,
    ) -> Result<CreateTokenResponse, OidcError> {
        self.post(
            "/token",
            &CreateTokenRequest {
                client_id,
                client_secret,
                grant_type: DEVICE_CODE_GRANT_TYPE,
                device_code,
            },
        )
        .await
    }
}
