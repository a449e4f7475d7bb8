//! OAuth credentials for Google Drive.
//!
//! Two ways of obtaining an access token are supported, chosen once at
//! startup from configuration:
//!
//! - a long-lived OAuth2 refresh token issued to a user account
//! - a service-account key, exchanged through a signed JWT assertion
//!
//! `TokenSource` caches the resulting access token and refreshes it shortly
//! before it expires.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::DriveConfig;
use crate::{MinutagError, Result};

/// OAuth scope requested for Drive access.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Grant type for service-account JWT assertions.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for service-account assertions, in seconds.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this many seconds before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Fallback lifetime when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Fields used from a service-account JSON key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account e-mail (JWT issuer).
    pub client_email: String,
    /// PEM-encoded RSA private key.
    pub private_key: String,
    /// Token endpoint named in the key file.
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Read a service-account key from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse a service-account key from JSON.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MinutagError::Config(format!("invalid service account key: {e}")))
    }
}

/// Claims of a service-account JWT assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// A credential able to mint Drive access tokens.
#[derive(Clone)]
pub enum Credential {
    /// OAuth2 refresh token issued to a user account.
    RefreshToken {
        /// OAuth2 client ID.
        client_id: String,
        /// OAuth2 client secret.
        client_secret: String,
        /// Long-lived refresh token.
        refresh_token: String,
    },
    /// Service account authenticating with a signed JWT.
    ServiceAccount(ServiceAccountKey),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::RefreshToken { client_id, .. } => f
                .debug_struct("RefreshToken")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Credential::ServiceAccount(key) => f.debug_tuple("ServiceAccount").field(key).finish(),
        }
    }
}

impl Credential {
    /// Pick the credential described by the configuration.
    ///
    /// A service-account key path wins over refresh-token fields. Returns
    /// `None` when neither is configured.
    pub fn from_config(config: &DriveConfig) -> Result<Option<Self>> {
        if config.has_service_account() {
            let key = ServiceAccountKey::from_file(&config.service_account_key_path)?;
            return Ok(Some(Credential::ServiceAccount(key)));
        }

        if config.has_refresh_token() {
            return Ok(Some(Credential::RefreshToken {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                refresh_token: config.refresh_token.clone(),
            }));
        }

        Ok(None)
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::RefreshToken { .. } => "refresh_token",
            Credential::ServiceAccount(_) => "service_account",
        }
    }

    /// Token endpoint to use, preferring the one from a service-account key.
    fn token_uri<'a>(&'a self, default_uri: &'a str) -> &'a str {
        match self {
            Credential::ServiceAccount(ServiceAccountKey {
                token_uri: Some(uri),
                ..
            }) => uri,
            _ => default_uri,
        }
    }

    /// Form fields for the token request.
    fn token_request(
        &self,
        token_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<(&'static str, String)>> {
        match self {
            Credential::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => Ok(vec![
                ("grant_type", "refresh_token".to_string()),
                ("client_id", client_id.clone()),
                ("client_secret", client_secret.clone()),
                ("refresh_token", refresh_token.clone()),
            ]),
            Credential::ServiceAccount(key) => {
                let claims = assertion_claims(key, token_uri, now);
                let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
                    .map_err(|e| MinutagError::Config(format!("invalid service account key: {e}")))?;
                let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
                    .map_err(|e| MinutagError::Auth(format!("failed to sign assertion: {e}")))?;

                Ok(vec![
                    ("grant_type", JWT_BEARER_GRANT.to_string()),
                    ("assertion", assertion),
                ])
            }
        }
    }
}

fn assertion_claims<'a>(
    key: &'a ServiceAccountKey,
    token_uri: &'a str,
    now: DateTime<Utc>,
) -> AssertionClaims<'a> {
    let iat = now.timestamp();
    AssertionClaims {
        iss: &key.client_email,
        scope: DRIVE_SCOPE,
        aud: token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

/// Caching source of Drive access tokens.
#[derive(Debug)]
pub struct TokenSource {
    http: Client,
    credential: Credential,
    token_uri: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    /// Create a token source for the given credential.
    pub fn new(http: Client, credential: Credential, token_uri: impl Into<String>) -> Self {
        Self {
            http,
            credential,
            token_uri: token_uri.into(),
            cached: Mutex::new(None),
        }
    }

    /// Return a valid access token, refreshing it if needed.
    ///
    /// Concurrent callers share a single refresh.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.fetch().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let token_uri = self.credential.token_uri(&self.token_uri);
        let now = Utc::now();
        let form = self.credential.token_request(token_uri, now)?;

        let response = self
            .http
            .post(token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| MinutagError::Auth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MinutagError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MinutagError::Auth(format!("invalid token response: {e}")))?;

        tracing::debug!(
            credential = self.credential.kind(),
            expires_in = ?token.expires_in,
            "Obtained Drive access token"
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now
                + Duration::seconds(token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)),
        })
    }
}
