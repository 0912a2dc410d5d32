//! Google OAuth 2.0 credentials shared by the Gmail and Calendar clients.
//!
//! Token JSON uses the authorized-user layout (`token`, `refresh_token`,
//! `token_uri`, `client_id`, `client_secret`, `scopes`, `expiry`), so a
//! `token.json` written by [`exchange_code`] can be pasted straight into
//! `GOOGLE_TOKEN_JSON`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Scopes requested by the consent flow.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/calendar",
];

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum GoogleAuthError {
    #[error("invalid token JSON: {0}")]
    InvalidToken(String),
    #[error("invalid client credentials: {0}")]
    InvalidCredentials(String),
    #[error("token expired and no refresh token is available")]
    NotRefreshable,
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OAuth flow cancelled: {0}")]
    FlowCancelled(String),
    #[error("OAuth state mismatch")]
    StateMismatch,
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Authorized-user token material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleToken {
    #[serde(default, alias = "access_token")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// RFC 3339 expiry of `token`.
    #[serde(default)]
    pub expiry: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

impl GoogleToken {
    /// A token without an expiry is trusted until the API says otherwise.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() {
            return false;
        }
        match &self.expiry {
            None => true,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(expiry) => expiry.with_timezone(&Utc) > now + Duration::seconds(EXPIRY_SKEW_SECS),
                Err(_) => false,
            },
        }
    }

    fn fill_client(&mut self, client: &OAuthClient) {
        if self.client_id.is_none() {
            self.client_id = Some(client.client_id.clone());
        }
        if self.client_secret.is_none() {
            self.client_secret = client.client_secret.clone();
        }
    }
}

/// `credentials.json` as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<OAuthClient>,
    #[serde(default)]
    web: Option<OAuthClient>,
}

impl ClientSecretsFile {
    pub fn parse(json: &str) -> Result<Self, GoogleAuthError> {
        serde_json::from_str(json).map_err(|e| GoogleAuthError::InvalidCredentials(e.to_string()))
    }

    pub fn client(&self) -> Result<&OAuthClient, GoogleAuthError> {
        self.installed
            .as_ref()
            .or(self.web.as_ref())
            .ok_or_else(|| {
                GoogleAuthError::InvalidCredentials(
                    "expected an \"installed\" or \"web\" client".to_string(),
                )
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Live credentials with an access token refreshed inline when expired.
pub struct GoogleCredentials {
    http: reqwest::Client,
    token: Mutex<GoogleToken>,
}

impl GoogleCredentials {
    /// Parse the environment-provided blobs and make sure a usable access
    /// token exists, refreshing once if needed.
    pub async fn from_json(
        token_json: &str,
        credentials_json: &str,
        http: reqwest::Client,
    ) -> Result<Self, GoogleAuthError> {
        let mut token: GoogleToken = serde_json::from_str(token_json)
            .map_err(|e| GoogleAuthError::InvalidToken(e.to_string()))?;
        let secrets = ClientSecretsFile::parse(credentials_json)?;
        token.fill_client(secrets.client()?);

        let credentials = Self {
            http,
            token: Mutex::new(token),
        };
        credentials.access_token().await?;
        Ok(credentials)
    }

    /// Current access token, refreshed first if it is expired.
    pub async fn access_token(&self) -> Result<String, GoogleAuthError> {
        let mut token = self.token.lock().await;
        if token.is_valid(Utc::now()) {
            return Ok(token.token.clone());
        }

        log::debug!("Google: access token expired, refreshing");
        refresh(&self.http, &mut token).await?;
        Ok(token.token.clone())
    }
}

/// Exchange the refresh token for a new access token, updating `token` in place.
pub async fn refresh(http: &reqwest::Client, token: &mut GoogleToken) -> Result<(), GoogleAuthError> {
    let refresh_token = token
        .refresh_token
        .clone()
        .ok_or(GoogleAuthError::NotRefreshable)?;
    let client_id = token.client_id.clone().unwrap_or_default();
    let client_secret = token.client_secret.clone().unwrap_or_default();

    let resp = http
        .post(&token.token_uri)
        .form(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        log::error!("Google: token refresh failed: {} - {}", status, body);
        return Err(GoogleAuthError::RefreshFailed(format!("HTTP {}: {}", status, body)));
    }

    let body: OAuthTokenResponse = resp
        .json()
        .await
        .map_err(|e| GoogleAuthError::RefreshFailed(e.to_string()))?;

    apply_token_response(token, body, Utc::now());
    log::info!("Google: access token refreshed");
    Ok(())
}

fn apply_token_response(token: &mut GoogleToken, body: OAuthTokenResponse, now: DateTime<Utc>) {
    token.token = body.access_token;
    token.expiry = Some((now + Duration::seconds(body.expires_in.unwrap_or(3600))).to_rfc3339());
    if body.refresh_token.is_some() {
        token.refresh_token = body.refresh_token;
    }
}

/// Consent URL for the installed-app flow, requesting offline access.
pub fn authorization_url(
    client: &OAuthClient,
    redirect_uri: &str,
    state: &str,
) -> Result<String, GoogleAuthError> {
    let scope = SCOPES.join(" ");
    let url = url::Url::parse_with_params(
        &client.auth_uri,
        &[
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|e| GoogleAuthError::InvalidCredentials(format!("bad auth_uri: {}", e)))?;
    Ok(url.into())
}

/// Extract the authorization code from the redirect's request line
/// (`GET /?code=...&state=... HTTP/1.1`).
pub fn parse_redirect(request_line: &str, expected_state: &str) -> Result<String, GoogleAuthError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| GoogleAuthError::FlowCancelled("empty redirect request".to_string()))?;
    let url = url::Url::parse(&format!("http://localhost{}", target))
        .map_err(|e| GoogleAuthError::FlowCancelled(e.to_string()))?;

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    if let Some(error) = param("error") {
        return Err(GoogleAuthError::FlowCancelled(error));
    }
    if param("state").as_deref() != Some(expected_state) {
        return Err(GoogleAuthError::StateMismatch);
    }
    param("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GoogleAuthError::FlowCancelled("no authorization code received".to_string()))
}

/// Trade an authorization code for a token in the authorized-user layout.
pub async fn exchange_code(
    http: &reqwest::Client,
    client: &OAuthClient,
    code: &str,
    redirect_uri: &str,
) -> Result<GoogleToken, GoogleAuthError> {
    let client_secret = client.client_secret.clone().unwrap_or_default();
    let resp = http
        .post(&client.token_uri)
        .form(&[
            ("code", code),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    if !resp.status().is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleAuthError::RefreshFailed(format!("Token exchange failed: {}", body)));
    }

    let body: OAuthTokenResponse = resp
        .json()
        .await
        .map_err(|e| GoogleAuthError::RefreshFailed(e.to_string()))?;

    let mut token = GoogleToken {
        token: String::new(),
        refresh_token: None,
        token_uri: client.token_uri.clone(),
        client_id: Some(client.client_id.clone()),
        client_secret: client.client_secret.clone(),
        scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        expiry: None,
    };
    apply_token_response(&mut token, body, Utc::now());
    Ok(token)
}
