use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::{GoogleConfig, OAuthConfig};
use crate::error::AppError;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const SCOPES: &str = "profile email";

/// Profile attributes resolved from the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalProfile {
    /// Provider-scoped subject id.
    pub sub: String,
    pub email: Option<String>,
    /// `Some(false)` when the provider has not verified `email`.
    #[serde(default)]
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Redirect-based identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the user agent to start a login.
    fn authorize_url(&self, state: &str) -> anyhow::Result<String>;

    /// Trade an authorization grant for the user's profile.
    async fn exchange(&self, code: &str) -> Result<ExternalProfile, AppError>;
}

/// Pick the Google provider when credentials are configured, the development provider
/// otherwise.
pub fn provider_from_config(cfg: &OAuthConfig) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    match &cfg.google {
        Some(google) => Ok(Arc::new(GoogleProvider::new(google, &cfg.callback_url)?)),
        None => {
            warn!("GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET not set");
            warn!(
                "using the DEVELOPMENT identity provider; every Google login resolves to a \
                 demo account. Do not run this in production"
            );
            Ok(Arc::new(DevIdentityProvider::new(&cfg.callback_url)))
        }
    }
}

pub struct GoogleProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    callback_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GoogleProvider {
    pub fn new(cfg: &GoogleConfig, callback_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            callback_url: callback_url.to_owned(),
        })
    }
}

fn upstream(what: &str, e: reqwest::Error) -> AppError {
    warn!(error = %e, what, "google request failed");
    AppError::Upstream(format!("{what} failed"))
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self, state: &str) -> anyhow::Result<String> {
        let url = Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<ExternalProfile, AppError> {
        let token: TokenResponse = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream("token exchange", e))?
            .json()
            .await
            .map_err(|e| upstream("token exchange", e))?;

        let profile: ExternalProfile = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream("profile fetch", e))?
            .json()
            .await
            .map_err(|e| upstream("profile fetch", e))?;

        debug!(sub = %profile.sub, "google profile fetched");
        Ok(profile)
    }
}

/// Non-production stand-in used when no Google client is configured. Skips the
/// provider hop and always resolves to the same demo profile.
pub struct DevIdentityProvider {
    callback_url: String,
}

impl DevIdentityProvider {
    pub const CODE: &'static str = "development-login";

    pub fn new(callback_url: &str) -> Self {
        Self {
            callback_url: callback_url.to_owned(),
        }
    }
}

#[async_trait]
impl IdentityProvider for DevIdentityProvider {
    fn authorize_url(&self, state: &str) -> anyhow::Result<String> {
        let url =
            Url::parse_with_params(&self.callback_url, &[("code", Self::CODE), ("state", state)])?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<ExternalProfile, AppError> {
        if code != Self::CODE {
            return Err(AppError::Upstream("unknown authorization code".into()));
        }
        Ok(ExternalProfile {
            sub: "development-12345".into(),
            email: Some("demo.user@example.com".into()),
            email_verified: Some(true),
            name: Some("Demo User".into()),
            picture: None,
        })
    }
}
