// SSO portal client (accounts, roles, role credentials)

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::credentials_file::ProfileCredentials;

const BEARER_HEADER: &str = "x-amz-sso_bearer_token";
const PAGE_SIZE: &str = "1000";

/// Get AWS SSO portal endpoint for region
pub fn get_sso_portal_url(region: &str) -> String {
    format!("https://portal.sso.{}.amazonaws.com", region)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub account_id: String,
    pub account_name: String,
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInfo {
    pub role_name: String,
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Unix milliseconds
    pub expiration: i64,
}

impl RoleCredentials {
    /// Credentials for a profile in `region`
    pub fn into_profile(self, region: &str) -> Result<ProfileCredentials> {
        let expiration = Utc
            .timestamp_millis_opt(self.expiration)
            .single()
            .with_context(|| format!("Invalid credential expiration: {}", self.expiration))?;

        Ok(ProfileCredentials {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            session_token: self.session_token,
            region: region.to_string(),
            expiration,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAccountsResponse {
    #[serde(default)]
    account_list: Vec<AccountInfo>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAccountRolesResponse {
    #[serde(default)]
    role_list: Vec<RoleInfo>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetRoleCredentialsResponse {
    role_credentials: RoleCredentials,
}

/// Portal API client authenticated with an SSO access token
pub struct SsoPortalClient {
    client: Client,
    endpoint: String,
}

impl SsoPortalClient {
    pub fn new(sso_region: &str) -> Result<Self> {
        Self::with_endpoint(get_sso_portal_url(sso_region))
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        access_token: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.endpoint, path);
        tracing::debug!("SSO portal request: GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .header(BEARER_HEADER, access_token)
            .send()
            .await
            .with_context(|| format!("Failed to send SSO portal request {}", path))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("SSO portal request {} failed: {} - {}", path, status, error_text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse SSO portal response {}", path))
    }

    /// All accounts the token can see, sorted by name
    pub async fn list_accounts(&self, access_token: &str) -> Result<Vec<AccountInfo>> {
        let mut accounts = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut query = vec![("max_result", PAGE_SIZE)];
            if let Some(ref token) = next_token {
                query.push(("next_token", token.as_str()));
            }

            let page: ListAccountsResponse =
                self.get("/assignment/accounts", &query, access_token).await?;
            accounts.extend(page.account_list);

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        accounts.sort_by(|a, b| a.account_name.cmp(&b.account_name));
        Ok(accounts)
    }

    /// Roles assignable in `account_id`, sorted by name
    pub async fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<RoleInfo>> {
        let mut roles = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut query = vec![("account_id", account_id), ("max_result", PAGE_SIZE)];
            if let Some(ref token) = next_token {
                query.push(("next_token", token.as_str()));
            }

            let page: ListAccountRolesResponse =
                self.get("/assignment/roles", &query, access_token).await?;
            roles.extend(page.role_list);

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        roles.sort_by(|a, b| a.role_name.cmp(&b.role_name));
        Ok(roles)
    }

    /// Short-term credentials for `role_name` in `account_id`
    pub async fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials> {
        let response: GetRoleCredentialsResponse = self
            .get(
                "/federation/credentials",
                &[("account_id", account_id), ("role_name", role_name)],
                access_token,
            )
            .await?;
        Ok(response.role_credentials)
    }
}
