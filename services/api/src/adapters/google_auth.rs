//! services/api/src/adapters/google_auth.rs
//!
//! Service-account credentials and OAuth2 access tokens for the Google APIs
//! behind Firebase (Firestore and the Identity Toolkit admin endpoints).
//!
//! Tokens are minted with the JWT-bearer grant: a short-lived assertion signed
//! with the service account's RSA key is exchanged at the account's token URI.
//! The resulting access token is cached until shortly before it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};
use velgo_core::ports::{PortError, PortResult};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SCOPES: &str = "https://www.googleapis.com/auth/cloud-platform \
                      https://www.googleapis.com/auth/datastore \
                      https://www.googleapis.com/auth/identitytoolkit";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens this close to expiry are refreshed.
const REFRESH_MARGIN_SECS: i64 = 60;

//=========================================================================================
// Service account key
//=========================================================================================

#[derive(Deserialize)]
struct ServiceAccountFile {
    project_id: String,
    private_key: String,
    client_email: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// The parts of a service-account key file the backend needs.
#[derive(Debug)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    private_key: SecretString,
    token_uri: String,
}

impl ServiceAccount {
    pub fn from_file(path: &Path) -> PortResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PortError::Unavailable(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> PortResult<Self> {
        let file: ServiceAccountFile = serde_json::from_str(contents)
            .map_err(|e| PortError::Unexpected(format!("malformed service account key: {}", e)))?;

        Ok(Self {
            project_id: file.project_id,
            client_email: file.client_email,
            private_key: SecretString::from(file.private_key),
            token_uri: file
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        })
    }

    /// Builds the signed assertion exchanged for an access token.
    fn assertion(&self, now: DateTime<Utc>) -> PortResult<String> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes())
            .map_err(|e| PortError::Unexpected(format!("invalid service account key: {}", e)))?;

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| PortError::Unexpected(format!("cannot sign token assertion: {}", e)))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

//=========================================================================================
// Access token source
//=========================================================================================

struct CachedToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

/// Hands out OAuth2 access tokens for a service account.
pub struct GoogleTokenSource {
    account: ServiceAccount,
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl GoogleTokenSource {
    pub fn new(account: ServiceAccount, http: reqwest::Client) -> Self {
        Self {
            account,
            http,
            cached: RwLock::new(None),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.account.project_id
    }

    /// Returns a valid access token, minting a new one when the cached token
    /// is missing or about to expire.
    pub async fn access_token(&self) -> PortResult<SecretString> {
        let now = Utc::now();
        if let Some(token) = self.cached.read().await.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let token = self.fetch(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch(&self, now: DateTime<Utc>) -> PortResult<CachedToken> {
        debug!("Requesting access token for {}", self.account.client_email);
        let assertion = self.account.assertion(now)?;

        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| PortError::Unavailable(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed token response: {}", e)))?;

        info!(
            "Obtained Google access token for {} (valid {}s)",
            self.account.client_email, token.expires_in
        );
        Ok(CachedToken {
            value: SecretString::from(token.access_token),
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}
