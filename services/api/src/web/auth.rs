//! services/api/src/web/auth.rs
//!
//! Token handling shared by the API routes, plus the admin session endpoints:
//! `POST /admin-auth` to open a session and `GET /logout` to close it.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    response::Redirect,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{info, warn};
use utoipa::ToSchema;
use velgo_core::domain::{authorize_admin, AdminAuthorization, VerifiedIdentity, USERS_COLLECTION};
use velgo_core::ports::{IdentityVerifier, PortError};

use crate::error::{ApiError, StatusMessage};
use crate::web::middleware::{clear_admin_session, establish_admin_session, session_keys};
use crate::web::state::AppState;

//=========================================================================================
// Token helpers
//=========================================================================================

/// Pulls the credential out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

/// Verifies a token, reporting provider rejections as `InvalidToken` with
/// the given message.
pub async fn verify_token(
    identity: &dyn IdentityVerifier,
    token: &str,
    rejection_message: &'static str,
) -> Result<VerifiedIdentity, ApiError> {
    identity.verify_id_token(token).await.map_err(|e| match e {
        PortError::InvalidToken(reason) => {
            warn!("Rejected ID token: {}", reason);
            ApiError::InvalidToken(rejection_message)
        }
        PortError::Unauthorized => ApiError::InvalidToken(rejection_message),
        other => ApiError::Port(other),
    })
}

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminAuthRequest {
    /// Firebase ID token of the signed-in user.
    #[serde(default)]
    pub token: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /admin-auth - Open an admin session from an ID token
#[utoipa::path(
    post,
    path = "/admin-auth",
    request_body = AdminAuthRequest,
    responses(
        (status = 200, description = "Admin session established", body = StatusMessage),
        (status = 400, description = "No token provided", body = StatusMessage),
        (status = 403, description = "Invalid token or not an admin", body = StatusMessage),
        (status = 404, description = "No user record for this identity", body = StatusMessage),
        (status = 503, description = "Document store unavailable", body = StatusMessage)
    )
)]
pub async fn admin_auth_handler(
    State(state): State<Arc<AppState>>,
    session: Session,
    body: Result<Json<AdminAuthRequest>, JsonRejection>,
) -> Result<Json<StatusMessage>, ApiError> {
    let store = state.store()?;
    let Json(request) = body.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;

    let token = request
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Validation("No token provided.".to_string()))?;

    let identity = verify_token(state.identity.as_ref(), &token, "Invalid token.").await?;
    let user_record = store.get(USERS_COLLECTION, &identity.uid).await?;

    match authorize_admin(&identity, user_record.as_ref()) {
        AdminAuthorization::Granted(admin) => {
            establish_admin_session(&session, &admin).await?;
            info!("Admin session created for: {} (UID: {})", admin.email, admin.uid);
            Ok(Json(StatusMessage::success_bare()))
        }
        AdminAuthorization::NotAdmin => {
            warn!("UID {} attempted admin login without the admin role", identity.uid);
            Err(ApiError::Forbidden("Not an admin user.".to_string()))
        }
        AdminAuthorization::RecordMissing => {
            Err(ApiError::NotFound("User record not found.".to_string()))
        }
    }
}

/// GET /logout - Revoke provider tokens and clear the admin session
pub async fn logout_handler(State(state): State<Arc<AppState>>, session: Session) -> Redirect {
    let admin_uid = session
        .get::<String>(session_keys::ADMIN_UID)
        .await
        .unwrap_or_else(|e| {
            warn!("Could not read session during logout: {}", e);
            None
        });

    match admin_uid {
        Some(uid) => match state.identity.revoke_refresh_tokens(&uid).await {
            Ok(()) => info!("Successfully revoked Firebase tokens for UID: {}", uid),
            Err(e) => warn!("Could not revoke Firebase tokens for UID {}: {}", uid, e),
        },
        None => info!("No admin UID in session; skipping token revocation."),
    }

    if let Err(e) = clear_admin_session(&session).await {
        warn!("Could not clear admin session: {}", e);
    }

    info!("Admin session cleared. Redirecting to home.");
    Redirect::to("/")
}
