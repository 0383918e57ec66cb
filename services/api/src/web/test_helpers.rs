//! Shared fixtures for the handler tests: a stub identity provider, an
//! in-memory store and a fully wired router.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
        Request,
    },
    response::Response,
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use testresult::TestResult;
use tower::ServiceExt;
use velgo_core::domain::VerifiedIdentity;
use velgo_core::ports::{
    DocumentStore, IdentityVerifier, PortError, PortResult, Query, StoredDocument,
};
use velgo_core::value::{Document, FieldValue};

use crate::adapters::InMemoryDocumentStore;
use crate::config::Config;
use crate::web::{build_router, middleware::SESSION_COOKIE_NAME, state::AppState};

pub const ADMIN_TOKEN: &str = "admin-token";
pub const ADMIN_UID: &str = "admin-uid";
pub const ADMIN_EMAIL: &str = "admin@velgo.example";
pub const USER_TOKEN: &str = "user-token";
pub const USER_UID: &str = "user-uid";
pub const USER_EMAIL: &str = "farmer@example.com";

/// Identity provider that knows a fixed set of tokens and records revocations.
pub struct StubIdentity {
    tokens: HashMap<String, VerifiedIdentity>,
    revoked: Mutex<Vec<String>>,
    revocation_down: AtomicBool,
}

impl StubIdentity {
    fn new() -> Self {
        let tokens = [
            (ADMIN_TOKEN, ADMIN_UID, ADMIN_EMAIL),
            (USER_TOKEN, USER_UID, USER_EMAIL),
        ]
        .into_iter()
        .map(|(token, uid, email)| {
            (
                token.to_string(),
                VerifiedIdentity {
                    uid: uid.to_string(),
                    email: Some(email.to_string()),
                },
            )
        })
        .collect();

        Self {
            tokens,
            revoked: Mutex::new(Vec::new()),
            revocation_down: AtomicBool::new(false),
        }
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }

    /// Makes every later revocation fail.
    pub fn fail_revocations(&self) {
        self.revocation_down.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityVerifier for StubIdentity {
    async fn verify_id_token(&self, token: &str) -> PortResult<VerifiedIdentity> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| PortError::InvalidToken("unknown test token".to_string()))
    }

    async fn revoke_refresh_tokens(&self, uid: &str) -> PortResult<()> {
        if self.revocation_down.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("identity toolkit unreachable".to_string()));
        }
        self.revoked.lock().unwrap().push(uid.to_string());
        Ok(())
    }
}

/// Store whose queries fail; point reads and writes go to the wrapped store.
pub struct QueryFailingStore {
    inner: Arc<InMemoryDocumentStore>,
}

#[async_trait]
impl DocumentStore for QueryFailingStore {
    async fn insert(&self, collection: &str, document: Document) -> PortResult<String> {
        self.inner.insert(collection, document).await
    }

    async fn update(&self, collection: &str, id: &str, changes: Document) -> PortResult<()> {
        self.inner.update(collection, id, changes).await
    }

    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, _collection: &str, _query: &Query) -> PortResult<Vec<StoredDocument>> {
        Err(PortError::Unexpected("query index missing".to_string()))
    }
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "SESSION_SECRET" => Some("test-session-secret-".repeat(4)),
        "STORE_BACKEND" => Some("memory".to_string()),
        "FIREBASE_PROJECT_ID" => Some("velgo-test".to_string()),
        "FIREBASE_WEB_API_KEY" => Some("test-web-api-key".to_string()),
        _ => None,
    })
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryDocumentStore>,
    pub identity: Arc<StubIdentity>,
}

impl TestApp {
    /// App backed by an in-memory store holding one admin user record.
    pub async fn new() -> Self {
        let store = seeded_store().await;
        Self::build(store.clone(), Some(store as Arc<dyn DocumentStore>))
    }

    /// Like `new`, but every store query fails.
    pub async fn with_failing_queries() -> Self {
        let store = seeded_store().await;
        let failing = Arc::new(QueryFailingStore {
            inner: store.clone(),
        });
        Self::build(store, Some(failing as Arc<dyn DocumentStore>))
    }

    /// App whose document store failed to come up.
    pub fn without_store() -> Self {
        Self::build(Arc::default(), None)
    }

    fn build(store: Arc<InMemoryDocumentStore>, backend: Option<Arc<dyn DocumentStore>>) -> Self {
        let identity = Arc::new(StubIdentity::new());
        let state = AppState {
            config: Arc::new(test_config()),
            project_id: Some("velgo-test".to_string()),
            store: backend,
            identity: identity.clone(),
        };
        let router = build_router(Arc::new(state)).unwrap();

        Self {
            router,
            store,
            identity,
        }
    }
}

async fn seeded_store() -> Arc<InMemoryDocumentStore> {
    let store = Arc::new(InMemoryDocumentStore::new());
    store
        .put(
            "users",
            ADMIN_UID,
            Document::from([
                ("role".to_string(), FieldValue::from("admin")),
                ("email".to_string(), FieldValue::from(ADMIN_EMAIL)),
            ]),
        )
        .await;
    store
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub fn post_json(path: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(path).header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_submission(path: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(path).header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn json_body(response: Response) -> TestResult<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn text_body(response: Response) -> TestResult<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// The `name=value` pair of a non-empty session cookie set by the response.
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find(|pair| {
            pair.strip_prefix(SESSION_COOKIE_NAME)
                .and_then(|rest| rest.strip_prefix('='))
                .is_some_and(|v| !v.is_empty())
        })
        .map(str::to_string)
}

/// Logs in with the seeded admin and returns the session cookie.
pub async fn admin_cookie(app: &TestApp) -> TestResult<String> {
    let response = send(
        &app.router,
        post_json("/admin-auth", serde_json::json!({ "token": ADMIN_TOKEN }), None),
    )
    .await;
    Ok(session_cookie(&response).ok_or("admin login did not set a session cookie")?)
}

/// The stored document, or an empty one when it does not exist.
pub async fn stored(app: &TestApp, collection: &str, id: &str) -> Document {
    app.store
        .get(collection, id)
        .await
        .unwrap()
        .unwrap_or_default()
}
