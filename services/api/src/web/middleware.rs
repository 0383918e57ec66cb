//! services/api/src/web/middleware.rs
//!
//! Session configuration and the extractors that turn the session into an
//! optional authenticated administrator.
//!
//! Sessions live server-side; the browser only holds a signed cookie with the
//! session id. An admin session slides for 30 days of inactivity, anything
//! else ends with the browser session.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::{
    cookie::{time::Duration, Key, SameSite},
    service::SignedCookie,
    session, Expiry, MemoryStore, Session, SessionManagerLayer,
};
use tracing::{info, warn};
use velgo_core::domain::{AdminIdentity, DEFAULT_ADMIN_EMAIL};

use crate::error::ApiError;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "velgo_session";

/// Lifetime of an admin session without activity.
pub const ADMIN_SESSION_DAYS: i64 = 30;

/// Keys under which the admin identity is stored.
pub mod session_keys {
    pub const ADMIN_LOGGED_IN: &str = "admin_logged_in";
    pub const ADMIN_EMAIL: &str = "admin_email";
    pub const ADMIN_UID: &str = "admin_uid";
}

/// Create the session layer with an in-memory store and signed cookies.
///
/// Non-empty sessions are saved on every request so an admin's inactivity
/// window restarts with each visit. Empty sessions are never stored.
pub fn create_session_layer(key: Key, secure: bool) -> SessionManagerLayer<MemoryStore, SignedCookie> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_always_save(true)
        .with_expiry(Expiry::OnSessionEnd)
        .with_secure(secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
        .with_signed(key)
}

/// Marks the session as belonging to `admin` and makes it persistent.
pub async fn establish_admin_session(
    session: &Session,
    admin: &AdminIdentity,
) -> Result<(), session::Error> {
    // New id on privilege change, so a pre-login cookie never becomes an admin cookie.
    session.cycle_id().await?;
    session.insert(session_keys::ADMIN_LOGGED_IN, true).await?;
    session.insert(session_keys::ADMIN_EMAIL, &admin.email).await?;
    session.insert(session_keys::ADMIN_UID, &admin.uid).await?;
    session.set_expiry(Some(Expiry::OnInactivity(Duration::days(ADMIN_SESSION_DAYS))));
    Ok(())
}

/// Removes the admin identity and returns the session to browser lifetime.
pub async fn clear_admin_session(session: &Session) -> Result<(), session::Error> {
    session.remove::<bool>(session_keys::ADMIN_LOGGED_IN).await?;
    session.remove::<String>(session_keys::ADMIN_EMAIL).await?;
    session.remove::<String>(session_keys::ADMIN_UID).await?;
    session.set_expiry(Some(Expiry::OnSessionEnd));
    Ok(())
}

/// Reads the admin identity from the session, if one is logged in.
pub async fn current_admin(session: &Session) -> Option<AdminIdentity> {
    let logged_in = match session.get::<bool>(session_keys::ADMIN_LOGGED_IN).await {
        Ok(flag) => flag.unwrap_or(false),
        Err(e) => {
            warn!("Could not read admin session: {}", e);
            false
        }
    };
    if !logged_in {
        return None;
    }

    let email = session
        .get::<String>(session_keys::ADMIN_EMAIL)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string());
    let uid = session
        .get::<String>(session_keys::ADMIN_UID)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();

    Some(AdminIdentity { uid, email })
}

//=========================================================================================
// Extractors
//=========================================================================================

/// Extractor that requires an admin session.
///
/// Browser routes are redirected to the landing page; `/api/` routes get a
/// 401 JSON error instead.
pub struct RequireAdmin(pub AdminIdentity);

/// Extractor that yields the admin identity when there is one.
pub struct OptionalAdmin(pub Option<AdminIdentity>);

/// Rejection for `RequireAdmin`.
pub enum AdminRejection {
    RedirectHome,
    Unauthorized,
}

impl IntoResponse for AdminRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectHome => Redirect::to("/").into_response(),
            Self::Unauthorized => ApiError::Unauthorized.into_response(),
        }
    }
}

async fn session_admin(parts: &Parts) -> Option<AdminIdentity> {
    match parts.extensions.get::<Session>() {
        Some(session) => current_admin(session).await,
        None => None,
    }
}

impl<S> FromRequestParts<S> for OptionalAdmin
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_admin(parts).await))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AdminRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_admin(parts).await.map(Self).ok_or_else(|| {
            if parts.uri.path().starts_with("/api/") {
                AdminRejection::Unauthorized
            } else {
                info!("Admin access denied for {}. Redirecting to home.", parts.uri.path());
                AdminRejection::RedirectHome
            }
        })
    }
}
