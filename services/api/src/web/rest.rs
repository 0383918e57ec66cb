//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the JSON API endpoints and the master
//! definition for the OpenAPI specification.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use utoipa::{OpenApi, ToSchema};
use velgo_core::domain::{new_submission, StatusUpdate, SubmissionKind, SubmissionStatus};
use velgo_core::value::document_from_json;

use crate::error::{ApiError, StatusMessage};
use crate::web::auth::{self, bearer_token, verify_token, AdminAuthRequest};
use crate::web::middleware::RequireAdmin;
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        book_handler,
        consult_handler,
        update_status_handler,
        auth::admin_auth_handler,
    ),
    components(
        schemas(StatusMessage, UpdateStatusRequest, AdminAuthRequest)
    ),
    tags(
        (name = "Velgo API", description = "Booking and consultation intake and admin review.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Payload Structs
//=========================================================================================

/// Body of a status change request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub doc_id: Option<String>,
    /// `bookings` or `consultations`.
    #[serde(default)]
    pub collection: Option<String>,
    /// `accepted`, `rejected` or `completed`.
    #[serde(default)]
    pub new_status: Option<String>,
    /// Only kept when rejecting.
    #[serde(default)]
    pub reason: Option<String>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Submit a booking request.
///
/// Accepts any JSON object; the server adds the submitter's identity, a
/// timestamp and the initial `pending` status.
#[utoipa::path(
    post,
    path = "/api/book",
    request_body(content = Object, description = "Booking form fields."),
    params(
        ("Authorization" = String, Header, description = "`Bearer <Firebase ID token>`")
    ),
    responses(
        (status = 200, description = "Booking stored", body = StatusMessage),
        (status = 400, description = "Body is not a JSON object", body = StatusMessage),
        (status = 401, description = "Missing bearer token", body = StatusMessage),
        (status = 403, description = "Invalid token", body = StatusMessage),
        (status = 503, description = "Document store unavailable", body = StatusMessage)
    )
)]
pub async fn book_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<StatusMessage>, ApiError> {
    accept_submission(&state, SubmissionKind::Booking, &headers, body).await
}

/// Submit a consultation request.
#[utoipa::path(
    post,
    path = "/api/consult",
    request_body(content = Object, description = "Consultation form fields."),
    params(
        ("Authorization" = String, Header, description = "`Bearer <Firebase ID token>`")
    ),
    responses(
        (status = 200, description = "Consultation stored", body = StatusMessage),
        (status = 400, description = "Body is not a JSON object", body = StatusMessage),
        (status = 401, description = "Missing bearer token", body = StatusMessage),
        (status = 403, description = "Invalid token", body = StatusMessage),
        (status = 503, description = "Document store unavailable", body = StatusMessage)
    )
)]
pub async fn consult_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<StatusMessage>, ApiError> {
    accept_submission(&state, SubmissionKind::Consultation, &headers, body).await
}

async fn accept_submission(
    state: &AppState,
    kind: SubmissionKind,
    headers: &HeaderMap,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<StatusMessage>, ApiError> {
    let store = state.store()?;
    let token = bearer_token(headers).ok_or(ApiError::MissingToken)?;
    let identity =
        verify_token(state.identity.as_ref(), token, "Invalid authentication token.").await?;
    let Json(fields) = body.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;

    let document = new_submission(document_from_json(fields), &identity, Utc::now());
    let doc_id = store.insert(kind.collection(), document).await?;

    info!(
        "Stored {} document {} for UID {}",
        kind.collection(),
        doc_id,
        identity.uid
    );
    Ok(Json(StatusMessage::success(kind.acknowledgement())))
}

/// Move a submission to a new status. Requires an admin session.
#[utoipa::path(
    post,
    path = "/api/update_status",
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = StatusMessage),
        (status = 400, description = "Missing field, unknown status or collection", body = StatusMessage),
        (status = 401, description = "No admin session", body = StatusMessage),
        (status = 500, description = "Store error, e.g. unknown document", body = StatusMessage),
        (status = 503, description = "Document store unavailable", body = StatusMessage)
    )
)]
pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<StatusMessage>, ApiError> {
    let store = state.store()?;
    let Json(request) = body.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;

    let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
    let (Some(doc_id), Some(collection), Some(new_status)) = (
        non_empty(request.doc_id),
        non_empty(request.collection),
        non_empty(request.new_status),
    ) else {
        return Err(ApiError::Validation(
            "Missing doc_id, collection, or new_status".to_string(),
        ));
    };

    let status = SubmissionStatus::parse_target(&new_status)
        .ok_or_else(|| ApiError::Validation("Invalid status provided.".to_string()))?;
    let kind = SubmissionKind::from_collection(&collection)
        .ok_or_else(|| ApiError::Validation("Unknown collection.".to_string()))?;

    let update = StatusUpdate::new(status, request.reason.as_deref());
    store
        .update(kind.collection(), &doc_id, update.into_changes(Utc::now()))
        .await?;

    info!(
        "{} set {}/{} to {}",
        admin.email,
        kind.collection(),
        doc_id,
        status
    );
    Ok(Json(StatusMessage::success(format!(
        "Status updated to {}",
        status
    ))))
}
