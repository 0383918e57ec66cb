//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every handler, and how it is
//! assembled from the configuration at startup.

use crate::adapters::{
    FirebaseAuthAdapter, FirestoreAdapter, GoogleTokenSource, InMemoryDocumentStore,
    ServiceAccount, UnconfiguredIdentity,
};
use crate::config::{Config, StoreBackend};
use crate::error::ApiError;
use std::sync::Arc;
use tracing::{error, info, warn};
use velgo_core::ports::{DocumentStore, IdentityVerifier};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Firebase project the tokens are issued for, if known.
    pub project_id: Option<String>,
    /// `None` when the store could not be initialised at startup.
    pub store: Option<Arc<dyn DocumentStore>>,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    /// Wires the adapters selected by `config`.
    ///
    /// Never fails: a missing key file or project id is logged, and the
    /// affected routes answer as unavailable.
    pub fn from_config(config: Arc<Config>, http: reqwest::Client) -> Self {
        let tokens = match ServiceAccount::from_file(&config.credentials_path) {
            Ok(account) => {
                info!("Loaded service account {}", account.client_email);
                Some(Arc::new(GoogleTokenSource::new(account, http.clone())))
            }
            Err(e) => {
                warn!(
                    "Could not load service account from {}: {}",
                    config.credentials_path.display(),
                    e
                );
                None
            }
        };

        let project_id = config
            .firebase_project_id
            .clone()
            .or_else(|| tokens.as_ref().map(|t| t.project_id().to_string()));

        let store: Option<Arc<dyn DocumentStore>> = match (config.store_backend, &tokens, &project_id) {
            (StoreBackend::Memory, _, _) => {
                warn!("Using the in-memory document store; data is lost on restart.");
                Some(Arc::new(InMemoryDocumentStore::new()))
            }
            (StoreBackend::Firestore, Some(tokens), Some(project_id)) => Some(Arc::new(
                FirestoreAdapter::new(http.clone(), tokens.clone(), project_id),
            )),
            (StoreBackend::Firestore, _, _) => {
                error!("Firestore is unavailable without service account credentials.");
                None
            }
        };

        let identity: Arc<dyn IdentityVerifier> = match &project_id {
            Some(project_id) => Arc::new(FirebaseAuthAdapter::new(http, project_id.clone(), tokens)),
            None => {
                error!("No Firebase project id; set FIREBASE_PROJECT_ID or provide a key file.");
                Arc::new(UnconfiguredIdentity)
            }
        };

        Self {
            config,
            project_id,
            store,
            identity,
        }
    }

    /// The document store, or `StoreUnavailable` when it never came up.
    pub fn store(&self) -> Result<&dyn DocumentStore, ApiError> {
        self.store.as_deref().ok_or(ApiError::StoreUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::json;
    use testresult::TestResult;
    use velgo_core::ports::PortError;

    use crate::web::build_router;
    use crate::web::test_helpers::{json_body, post_json, post_submission, send, USER_TOKEN};

    fn config_without_credentials(backend: &str) -> Arc<Config> {
        let backend = backend.to_string();
        Arc::new(
            Config::from_lookup(move |key| match key {
                "SESSION_SECRET" => Some("startup-session-secret-".repeat(4)),
                "STORE_BACKEND" => Some(backend.clone()),
                "GOOGLE_APPLICATION_CREDENTIALS" => {
                    Some("does-not-exist/firebase-admin-sdk.json".to_string())
                }
                _ => None,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn missing_key_file_and_project_still_starts() -> TestResult {
        let state = AppState::from_config(config_without_credentials("firestore"), reqwest::Client::new());
        assert!(state.project_id.is_none());
        assert!(state.store.is_none());

        let router = build_router(Arc::new(state))?;

        let landing = send(&router, Request::get("/").body(Body::empty())?).await;
        assert_eq!(landing.status(), StatusCode::OK);

        let booking = send(&router, post_submission("/api/book", json!({}), Some(USER_TOKEN))).await;
        assert_eq!(booking.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json_body(booking).await?["message"],
            "Backend document store connection error."
        );

        let login = send(&router, post_json("/admin-auth", json!({ "token": "t" }), None)).await;
        assert_eq!(login.status(), StatusCode::SERVICE_UNAVAILABLE);
        Ok(())
    }

    #[tokio::test]
    async fn memory_backend_without_project_reports_identity_unavailable() -> TestResult {
        let state = AppState::from_config(config_without_credentials("memory"), reqwest::Client::new());
        assert!(state.store.is_some());

        let err = state.identity.verify_id_token("t").await.unwrap_err();
        assert!(matches!(err, PortError::Unavailable(_)));

        let router = build_router(Arc::new(state))?;
        let booking = send(&router, post_submission("/api/book", json!({}), Some(USER_TOKEN))).await;
        assert_eq!(booking.status(), StatusCode::SERVICE_UNAVAILABLE);
        Ok(())
    }
}
