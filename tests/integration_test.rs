// Integration tests for awsx
//
// These tests drive the token lifecycle against a local SSO OIDC server,
// covering the HTTP client, the device authorization driver, the manager
// and the YAML token store together.

use chrono::{Duration as ChronoDuration, Utc};
use mockito::{Mock, ServerGuard};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use awsx::{
    auth::{
        DeviceAuthorizationDriver, DriverOptions, FileTokenStore, HttpOidcClient, SystemClock,
        TokenLifecycleManager, TokenStore, UrlOpener,
    },
    error::{AuthError, CancelReason},
};

const START_URL: &str = "https://example.awsapps.com/start";
const VERIFICATION_URL: &str = "https://device.sso.us-east-1.amazonaws.com/?user_code=WDDD-HRQV";

// ==================================================================================================
// Test Helpers
// ==================================================================================================

/// Records opened URLs instead of launching a browser
#[derive(Default)]
struct RecordingOpener {
    opened: Mutex<Vec<String>>,
}

impl UrlOpener for RecordingOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

struct Harness {
    dir: TempDir,
    server: ServerGuard,
    store: Arc<FileTokenStore>,
    opener: Arc<RecordingOpener>,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileTokenStore::new(
            dir.path().join("awsx").join("cache").join("access-token"),
        ));
        Self {
            dir,
            server: mockito::Server::new_async().await,
            store,
            opener: Arc::new(RecordingOpener::default()),
        }
    }

    fn manager(&self, options: DriverOptions) -> TokenLifecycleManager {
        self.manager_with_store(options, self.store.clone())
    }

    fn manager_with_store(
        &self,
        options: DriverOptions,
        store: Arc<dyn TokenStore>,
    ) -> TokenLifecycleManager {
        let oidc = HttpOidcClient::with_endpoint(self.server.url()).unwrap();
        let driver = DeviceAuthorizationDriver::new(
            Arc::new(oidc),
            self.opener.clone(),
            Arc::new(SystemClock),
            options,
        );
        TokenLifecycleManager::new(driver, store)
    }

    async fn mock_register(&mut self) -> Mock {
        self.server
            .mock("POST", "/client/register")
            .match_body(mockito::Matcher::PartialJson(json!({
                "clientName": "awsx",
                "clientType": "public"
            })))
            .with_status(200)
            .with_body(
                json!({
                    "clientId": "integration-client",
                    "clientSecret": "integration-secret",
                    "clientSecretExpiresAt": 4_102_444_800i64
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    async fn mock_device_authorization(&mut self) -> Mock {
        self.server
            .mock("POST", "/device_authorization")
            .match_body(mockito::Matcher::PartialJson(json!({
                "clientId": "integration-client",
                "startUrl": START_URL
            })))
            .with_status(200)
            .with_body(
                json!({
                    "deviceCode": "integration-device",
                    "userCode": "WDDD-HRQV",
                    "verificationUri": "https://device.sso.us-east-1.amazonaws.com/",
                    "verificationUriComplete": VERIFICATION_URL,
                    "expiresIn": 600,
                    "interval": 1
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    async fn mock_token(&mut self, status: usize, body: serde_json::Value) -> Mock {
        self.server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::PartialJson(json!({
                "grantType": "urn:ietf:params:oauth:grant-type:device_code",
                "deviceCode": "integration-device"
            })))
            .with_status(status)
            .with_body(body.to_string())
            .create_async()
            .await
    }
}

fn no_browser() -> DriverOptions {
    DriverOptions {
        open_browser: false,
        ..DriverOptions::default()
    }
}

// ==================================================================================================
// Lifecycle Tests
// ==================================================================================================

#[tokio::test]
async fn test_first_login_registers_and_persists() {
    let mut harness = Harness::new().await;
    let register = harness.mock_register().await;
    let authorize = harness.mock_device_authorization().await;
    let token = harness
        .mock_token(
            200,
            json!({
                "accessToken": "integration-token",
                "tokenType": "Bearer",
                "expiresIn": 28800
            }),
        )
        .await;

    let manager = harness.manager(DriverOptions::default());
    let before = Utc::now();
    let record = manager
        .ensure_valid_credentials("default", START_URL, &CancellationToken::new())
        .await
        .unwrap();
    let after = Utc::now();

    register.assert_async().await;
    authorize.assert_async().await;
    token.assert_async().await;

    assert_eq!(record.access_token, "integration-token");
    assert_eq!(record.client_id, "integration-client");
    assert_eq!(record.device_code, "integration-device");
    assert_eq!(record.verification_uri_complete, VERIFICATION_URL);
    assert_eq!(record.start_url, START_URL);

    let lifetime = ChronoDuration::hours(8) - ChronoDuration::minutes(5);
    assert!(record.access_token_expires_at >= before + lifetime - ChronoDuration::seconds(1));
    assert!(record.access_token_expires_at <= after + lifetime + ChronoDuration::seconds(1));

    assert_eq!(harness.store.load("default"), Some(record));
    assert_eq!(
        *harness.opener.opened.lock().unwrap(),
        vec![VERIFICATION_URL.to_string()]
    );
}

#[tokio::test]
async fn test_second_call_reuses_cached_token() {
    let mut harness = Harness::new().await;
    let register = harness.mock_register().await;
    let authorize = harness.mock_device_authorization().await;
    let token = harness
        .mock_token(200, json!({"accessToken": "integration-token"}))
        .await;

    let manager = harness.manager(no_browser());
    let first = manager
        .ensure_valid_credentials("default", START_URL, &CancellationToken::new())
        .await
        .unwrap();
    let second = manager
        .ensure_valid_credentials("default", START_URL, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first, second);
    // Each endpoint hit exactly once across both calls
    register.assert_async().await;
    authorize.assert_async().await;
    token.assert_async().await;
    assert!(harness.opener.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_until_timeout_is_cancelled() {
    let mut harness = Harness::new().await;
    let _register = harness.mock_register().await;
    let _authorize = harness.mock_device_authorization().await;
    let _token = harness
        .server
        .mock("POST", "/token")
        .with_status(400)
        .with_header(
            "x-amzn-errortype",
            "AuthorizationPendingException:http://internal.amazon.com/coral/com.amazonaws.swbup.service/",
        )
        .with_body(json!({"error": "authorization_pending"}).to_string())
        .expect_at_least(1)
        .create_async()
        .await;

    let manager = harness.manager(DriverOptions {
        poll_interval: Duration::from_millis(20),
        poll_timeout: Some(Duration::from_millis(200)),
        open_browser: false,
    });
    let err = manager
        .ensure_valid_credentials("default", START_URL, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuthError::Cancelled(CancelReason::Deadline(_))
    ));
    assert!(harness.store.load("default").is_none());
}

#[tokio::test]
async fn test_cancelled_before_approval() {
    let mut harness = Harness::new().await;
    let _register = harness.mock_register().await;
    let _authorize = harness.mock_device_authorization().await;
    let token = harness
        .server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(json!({"accessToken": "never"}).to_string())
        .expect(0)
        .create_async()
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = harness
        .manager(no_browser())
        .ensure_valid_credentials("default", START_URL, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Cancelled(CancelReason::Signal)));
    token.assert_async().await;
    assert!(harness.store.load("default").is_none());
}

#[tokio::test]
async fn test_denied_authorization_is_api_error() {
    let mut harness = Harness::new().await;
    let _register = harness.mock_register().await;
    let _authorize = harness.mock_device_authorization().await;
    let _token = harness
        .mock_token(
            400,
            json!({"error": "access_denied", "error_description": "User denied the request"}),
        )
        .await;

    let err = harness
        .manager(no_browser())
        .ensure_valid_credentials("default", START_URL, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        AuthError::Api { code, message, .. } => {
            assert_eq!(code, "access_denied");
            assert_eq!(message, "User denied the request");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!harness.store.path().exists());
}

#[tokio::test]
async fn test_unwritable_store_returns_unpersisted_record() {
    let mut harness = Harness::new().await;
    let _register = harness.mock_register().await;
    let _authorize = harness.mock_device_authorization().await;
    let _token = harness
        .mock_token(200, json!({"accessToken": "unsaved-token"}))
        .await;

    // A regular file where the cache directory should be
    let blocker = harness.dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let store = Arc::new(FileTokenStore::new(blocker.join("access-token")));

    let err = harness
        .manager_with_store(no_browser(), store)
        .ensure_valid_credentials("default", START_URL, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("failed to persist token for 'default'"));
    let record = err.into_unpersisted_record().unwrap();
    assert_eq!(record.access_token, "unsaved-token");
}
