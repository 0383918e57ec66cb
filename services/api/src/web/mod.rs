pub mod auth;
pub mod middleware;
pub mod pages;
pub mod rest;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::cookie::Key;

use crate::config::ConfigError;
use crate::error::ApiError;
use state::AppState;

pub use auth::{admin_auth_handler, logout_handler};
pub use pages::{admin_handler, index_handler};
pub use rest::{book_handler, consult_handler, update_status_handler};

/// Builds the application router with sessions, CORS and request tracing.
pub fn build_router(state: Arc<AppState>) -> Result<Router, ApiError> {
    let key = Key::try_from(state.config.session_secret.expose_secret().as_bytes())
        .map_err(|e| ConfigError::InvalidValue("SESSION_SECRET".to_string(), e.to_string()))?;
    let sessions = middleware::create_session_layer(key, state.config.secure_cookies);

    let cors = match state.config.cors_allowed_origin.as_deref() {
        None => CorsLayer::permissive(),
        Some(origin) => {
            let origin = origin.parse::<HeaderValue>().map_err(|e| {
                ConfigError::InvalidValue("CORS_ALLOWED_ORIGIN".to_string(), e.to_string())
            })?;
            CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
        }
    };

    let router = Router::new()
        // JSON API
        .route("/api/book", post(book_handler))
        .route("/api/consult", post(consult_handler))
        .route("/api/update_status", post(update_status_handler))
        .route("/admin-auth", post(admin_auth_handler))
        // Browser pages
        .route("/", get(index_handler))
        .route("/admin", get(admin_handler))
        .route("/logout", get(logout_handler))
        .layer(sessions)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}
