//! Google OAuth 2.0 for installed applications.
//!
//! Two ways of getting an authorization code are supported:
//!
//! 1. A loopback redirect: a listener on the callback port receives the
//!    browser redirect after the user grants access.
//! 2. A manual copy-paste flow using the out-of-band redirect URI, for hosts
//!    without a browser.
//!
//! Codes are exchanged for tokens at the token endpoint named in the client
//! secret file, which is also where refreshes go.

use super::callback::CallbackListener;
use super::credentials::AuthConfig;
use super::token::{Credential, TokenResponse};
use crate::error::{authorization_error, config_error, other_error, RelayResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Redirect URI asking Google to show the code to the user instead of redirecting
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// OAuth client registration downloaded from the Google Cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// The file wraps the registration in an `installed` or `web` key
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn from_json(content: &str) -> RelayResult<Self> {
        let file: ClientSecretFile = serde_json::from_str(content)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| config_error("Client secret file has neither an 'installed' nor a 'web' section"))
    }

    pub fn from_file(path: &Path) -> RelayResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            config_error(&format!(
                "Failed to read client secret file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }
}

/// A manual authorization waiting for the operator to supply a code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingAuthorization {
    pub url: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

/// Build the consent URL for the given redirect target
pub fn authorization_url(
    secret: &ClientSecret,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
) -> RelayResult<String> {
    let scope = scopes.join(" ");
    let url = Url::parse_with_params(
        &secret.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| config_error(&format!("Invalid authorization URI {}: {}", secret.auth_uri, e)))?;

    Ok(url.to_string())
}

/// Everything the credential manager needs from the authorization server
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    /// Exchange the refresh token for a new access token
    async fn refresh(&self, credential: &Credential) -> RelayResult<Credential>;

    /// Run the browser flow with a loopback redirect
    async fn authorize_local(&self, scopes: &[String]) -> RelayResult<Credential>;

    /// Start a manual authorization; the returned URL is shown to the operator
    fn manual_authorization(&self, scopes: &[String]) -> RelayResult<PendingAuthorization>;

    /// Exchange a code obtained through the manual flow
    async fn exchange_manual_code(&self, code: &str, scopes: &[String]) -> RelayResult<Credential>;
}

/// Google implementation of [`OAuthFlow`]
pub struct GoogleOAuth {
    secret: ClientSecret,
    client: Client,
    callback_port: u16,
    callback_timeout: Duration,
    manual_redirect_uri: String,
}

impl GoogleOAuth {
    pub fn new(secret: ClientSecret, config: &AuthConfig) -> Self {
        Self {
            secret,
            client: Client::new(),
            callback_port: config.callback_port,
            callback_timeout: config.callback_timeout,
            manual_redirect_uri: config.manual_redirect_uri.clone(),
        }
    }

    fn loopback_redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.callback_port)
    }

    /// POST a form to the token endpoint and parse the answer
    async fn request_token(&self, params: &[(&str, &str)]) -> RelayResult<TokenResponse> {
        let response = self
            .client
            .post(&self.secret.token_uri)
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(authorization_error(&format!(
                "Token endpoint returned HTTP {} - {}",
                status, error_body
            )));
        }

        Ok(response.json::<TokenResponse>().await?)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> RelayResult<Credential> {
        let response = self
            .request_token(&[
                ("client_id", self.secret.client_id.as_str()),
                ("client_secret", self.secret.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .await?;

        info!("Exchanged authorization code for tokens");
        Ok(Credential::from_response(response, scopes))
    }
}

#[async_trait]
impl OAuthFlow for GoogleOAuth {
    async fn refresh(&self, credential: &Credential) -> RelayResult<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| authorization_error("No refresh token in credential"))?;

        let response = self
            .request_token(&[
                ("client_id", self.secret.client_id.as_str()),
                ("client_secret", self.secret.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;

        info!("Refreshed access token");
        Ok(credential.clone().refreshed(response))
    }

    async fn authorize_local(&self, scopes: &[String]) -> RelayResult<Credential> {
        let state = Uuid::new_v4().to_string();
        let redirect_uri = self.loopback_redirect_uri();
        let auth_url = authorization_url(&self.secret, &redirect_uri, scopes, &state)?;

        // Bind before opening the browser so a busy port fails fast
        let listener = CallbackListener::bind(self.callback_port)?;

        info!("Opening browser for Google Calendar authorization...");
        debug!("Authorization URL: {}", auth_url);
        webbrowser::open(&auth_url)
            .map_err(|e| authorization_error(&format!("Failed to open browser: {}", e)))?;

        info!("Waiting for authorization callback on port {}...", self.callback_port);
        let timeout = self.callback_timeout;
        let callback = tokio::task::spawn_blocking(move || listener.wait(timeout))
            .await
            .map_err(|e| other_error(&format!("Callback listener task failed: {}", e)))??;

        if callback.state.as_deref() != Some(state.as_str()) {
            return Err(authorization_error(
                "OAuth state mismatch in callback, refusing the code",
            ));
        }

        self.exchange_code(&callback.code, &redirect_uri, scopes).await
    }

    fn manual_authorization(&self, scopes: &[String]) -> RelayResult<PendingAuthorization> {
        let state = Uuid::new_v4().to_string();
        let url = authorization_url(&self.secret, &self.manual_redirect_uri, scopes, &state)?;

        Ok(PendingAuthorization {
            url,
            state,
            created_at: Utc::now(),
        })
    }

    async fn exchange_manual_code(&self, code: &str, scopes: &[String]) -> RelayResult<Credential> {
        self.exchange_code(code, &self.manual_redirect_uri, scopes)
            .await
    }
}
