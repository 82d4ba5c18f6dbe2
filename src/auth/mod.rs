// Authentication module
// SSO OIDC device authorization and access token lifecycle

mod device;
mod manager;
mod oidc;
mod store;
mod types;

pub use device::{
    DeviceAuthorizationDriver, DriverOptions, SystemBrowser, UrlOpener, DEFAULT_POLL_INTERVAL,
};
pub use manager::TokenLifecycleManager;
pub use oidc::{get_aws_sso_oidc_url, HttpOidcClient, OidcApi};
pub use store::{FileTokenStore, TokenStore, TOKEN_STORE_VERSION};
pub use types::{
    access_token_lifetime, BrowserLaunch, ClientInformation, ClientRegistration, Clock,
    CreateTokenResponse, DeviceAuthorization, ExpiryState, IssuedToken, RegisterClientResponse,
    StartDeviceAuthorizationResponse, SystemClock,
};

#[cfg(any(test, feature = "test-utils"))]
pub use types::FixedClock;
