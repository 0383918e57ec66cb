//! services/api/src/adapters/firebase_auth.rs
//!
//! The identity adapter, the concrete implementation of the `IdentityVerifier`
//! port. ID tokens are verified locally against Google's published signing
//! keys; refresh-token revocation goes through the Identity Toolkit admin API.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use velgo_core::domain::VerifiedIdentity;
use velgo_core::ports::{IdentityVerifier, PortError, PortResult};

use super::google_auth::GoogleTokenSource;

const SECURE_TOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
/// Google rotates these keys roughly daily; an hour keeps lookups cheap.
const SIGNING_KEY_TTL: Duration = Duration::from_secs(60 * 60);
/// Unknown key ids trigger at most one key refetch per interval.
const MIN_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
/// Allowed clock skew when checking `auth_time`.
const CLOCK_SKEW_SECS: i64 = 300;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Verifies Firebase ID tokens issued for one project.
pub struct FirebaseAuthAdapter {
    http: reqwest::Client,
    project_id: String,
    signing_keys: Cache<String, DecodingKey>,
    last_key_refresh: Mutex<Option<Instant>>,
    tokens: Option<Arc<GoogleTokenSource>>,
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    auth_time: Option<i64>,
}

impl FirebaseAuthAdapter {
    /// Creates a new `FirebaseAuthAdapter`. Without a token source, tokens can
    /// still be verified but revocation is unavailable.
    pub fn new(
        http: reqwest::Client,
        project_id: String,
        tokens: Option<Arc<GoogleTokenSource>>,
    ) -> Self {
        Self {
            http,
            project_id,
            signing_keys: Cache::builder()
                .max_capacity(64)
                .time_to_live(SIGNING_KEY_TTL)
                .build(),
            last_key_refresh: Mutex::new(None),
            tokens,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[issuer_for(&self.project_id)]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
        validation
    }

    async fn signing_key(&self, kid: &str) -> PortResult<DecodingKey> {
        if let Some(key) = self.signing_keys.get(kid).await {
            return Ok(key);
        }

        // Held across the fetch so concurrent misses share one refresh.
        let mut last_refresh = self.last_key_refresh.lock().await;
        if let Some(key) = self.signing_keys.get(kid).await {
            return Ok(key);
        }
        if last_refresh.is_some_and(|at| at.elapsed() < MIN_KEY_REFRESH_INTERVAL) {
            warn!("Token signed with unknown key id '{}'; refresh throttled", kid);
            return Err(unknown_signing_key(kid));
        }

        *last_refresh = Some(Instant::now());
        self.refresh_signing_keys().await?;
        self.signing_keys
            .get(kid)
            .await
            .ok_or_else(|| unknown_signing_key(kid))
    }

    async fn refresh_signing_keys(&self) -> PortResult<()> {
        debug!("Fetching Firebase token signing keys");
        let jwks: JwkSet = self
            .http
            .get(SECURE_TOKEN_JWKS_URL)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| PortError::Unavailable(format!("signing keys unreachable: {}", e)))?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed signing keys: {}", e)))?;

        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => self.signing_keys.insert(kid, key).await,
                Err(e) => debug!("Skipping unusable signing key {}: {}", kid, e),
            }
        }
        Ok(())
    }
}

fn unknown_signing_key(kid: &str) -> PortError {
    PortError::InvalidToken(format!("unknown signing key '{}'", kid))
}

fn issuer_for(project_id: &str) -> String {
    format!("https://securetoken.google.com/{}", project_id)
}

/// Checks the Firebase-specific claims `jsonwebtoken` does not cover.
fn identity_from_claims(claims: FirebaseClaims, now: i64) -> PortResult<VerifiedIdentity> {
    if claims.sub.is_empty() {
        return Err(PortError::InvalidToken("token has an empty subject".to_string()));
    }
    if claims.auth_time.is_some_and(|t| t > now + CLOCK_SKEW_SECS) {
        return Err(PortError::InvalidToken(
            "token auth_time is in the future".to_string(),
        ));
    }
    Ok(VerifiedIdentity {
        uid: claims.sub,
        email: claims.email,
    })
}

//=========================================================================================
// `IdentityVerifier` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityVerifier for FirebaseAuthAdapter {
    async fn verify_id_token(&self, token: &str) -> PortResult<VerifiedIdentity> {
        let header = decode_header(token).map_err(|e| PortError::InvalidToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(PortError::InvalidToken(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| PortError::InvalidToken("token has no key id".to_string()))?;

        let key = self.signing_key(&kid).await?;
        let data = decode::<FirebaseClaims>(token, &key, &self.validation())
            .map_err(|e| PortError::InvalidToken(e.to_string()))?;

        identity_from_claims(data.claims, Utc::now().timestamp())
    }

    async fn revoke_refresh_tokens(&self, uid: &str) -> PortResult<()> {
        let tokens = self.tokens.as_ref().ok_or_else(|| {
            PortError::Unavailable("no service account credentials configured".to_string())
        })?;
        let access_token = tokens.access_token().await?;

        let url = format!(
            "{}/projects/{}/accounts:update",
            IDENTITY_TOOLKIT_URL, self.project_id
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token.expose_secret())
            .json(&json!({ "localId": uid, "validSince": Utc::now().timestamp() }))
            .send()
            .await
            .map_err(|e| PortError::Unavailable(format!("identity toolkit unreachable: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(format!("user {}", uid)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "identity toolkit returned {}: {}",
                status, body
            )));
        }

        info!("Revoked refresh tokens for UID {}", uid);
        Ok(())
    }
}

//=========================================================================================
// Fallback without a project
//=========================================================================================

/// Stands in for Firebase when no project id is known; every call reports the
/// provider as unavailable.
pub struct UnconfiguredIdentity;

#[async_trait]
impl IdentityVerifier for UnconfiguredIdentity {
    async fn verify_id_token(&self, _token: &str) -> PortResult<VerifiedIdentity> {
        Err(PortError::Unavailable(
            "Firebase project is not configured".to_string(),
        ))
    }

    async fn revoke_refresh_tokens(&self, _uid: &str) -> PortResult<()> {
        Err(PortError::Unavailable(
            "Firebase project is not configured".to_string(),
        ))
    }
}
