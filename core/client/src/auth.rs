//! Password-grant authentication and token management.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use lenda_common::{Error, Result};

/// OAuth client id/secret pair the marketplace hands to its own web client;
/// the token endpoint expects them as HTTP basic auth.
const CLIENT_ID: &str = "web";
const CLIENT_SECRET: &str = "web";
/// Scope requested with every grant.
const SCOPE: &str = "SCOPE_APP_WEB";
/// Token endpoint path under the API host.
const TOKEN_PATH: &str = "oauth/token";

/// Username/password pair exchanged for a bearer token.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Bearer tokens with expiration tracking.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        // Consider expired if less than a minute remaining.
        self.expires_at < Utc::now() + Duration::seconds(60)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl From<TokenResponse> for Tokens {
    fn from(response: TokenResponse) -> Self {
        let expires_in = response.expires_in.unwrap_or(299);
        Tokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }
}

async fn request_token(http: &Client, token_url: Url, form: &[(&str, &str)]) -> Result<Tokens> {
    let response = http
        .post(token_url)
        .basic_auth(CLIENT_ID, Some(CLIENT_SECRET))
        .form(form)
        .send()
        .await
        .map_err(|e| Error::Network(format!("token request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Authentication(format!(
            "token endpoint returned {}: {}",
            status, body
        )));
    }

    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::Authentication(format!("malformed token response: {}", e)))?;

    Ok(parsed.into())
}

fn token_url(host: &Url) -> Result<Url> {
    host.join(TOKEN_PATH)
        .map_err(|e| Error::Config(format!("invalid API host '{}': {}", host, e)))
}

/// Token manager that performs the initial password grant and refreshes
/// expired access tokens on demand.
pub struct TokenManager {
    http: Client,
    host: Url,
    tokens: tokio::sync::RwLock<Tokens>,
}

impl TokenManager {
    /// Exchange credentials for an initial token pair.
    pub async fn login(http: Client, host: Url, credentials: &Credentials) -> Result<Self> {
        let tokens = request_token(
            &http,
            token_url(&host)?,
            &[
                ("grant_type", "password"),
                ("username", &credentials.username),
                ("password", &credentials.password),
                ("scope", SCOPE),
            ],
        )
        .await?;

        Ok(Self {
            http,
            host,
            tokens: tokio::sync::RwLock::new(tokens),
        })
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        let tokens = self.tokens.read().await;
        if !tokens.is_expired() {
            return Ok(tokens.access_token.clone());
        }
        drop(tokens);

        let mut tokens = self.tokens.write().await;

        // Double-check after acquiring the write lock.
        if !tokens.is_expired() {
            return Ok(tokens.access_token.clone());
        }

        tracing::info!("refreshing expired access token");

        let refreshed = request_token(
            &self.http,
            token_url(&self.host)?,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", &tokens.refresh_token),
                ("scope", SCOPE),
            ],
        )
        .await?;

        *tokens = refreshed;
        Ok(tokens.access_token.clone())
    }
}
