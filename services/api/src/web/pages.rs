//! services/api/src/web/pages.rs
//!
//! Server-rendered HTML: the public landing page and the admin panel.

use askama::Template;
use axum::{
    extract::{Query, State},
    response::Html,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};
use velgo_core::domain::{fields, AdminView, SubmissionStatus, SERVICE_CATEGORIES, UNKNOWN_EMAIL};
use velgo_core::ports::StoredDocument;
use velgo_core::value::FieldValue;

use crate::error::ApiError;
use crate::web::middleware::{OptionalAdmin, RequireAdmin};
use crate::web::state::AppState;

/// Fields stamped by the server; shown in their own columns, not in the details.
const STAMPED_FIELDS: [&str; 6] = [
    fields::TIMESTAMP,
    fields::USER_UID,
    fields::USER_EMAIL,
    fields::STATUS,
    fields::REJECTION_REASON,
    fields::STATUS_UPDATED_AT,
];

//=========================================================================================
// Templates
//=========================================================================================

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    project_id: &'a str,
    web_api_key: &'a str,
    has_firebase_config: bool,
    is_admin: bool,
    categories: &'a [&'static str],
}

#[derive(Template)]
#[template(path = "admin.html")]
struct AdminTemplate<'a> {
    admin_email: &'a str,
    current_view: &'a str,
    is_dashboard: bool,
    collection: &'a str,
    consultations_active: bool,
    categories: Vec<CategoryLink>,
    rows: Vec<SubmissionRow>,
}

struct CategoryLink {
    name: &'static str,
    href: String,
    active: bool,
}

struct FieldRow {
    name: String,
    value: String,
}

struct SubmissionRow {
    doc_id: String,
    status: String,
    is_pending: bool,
    rejection_reason: String,
    submitted_at: String,
    user_email: String,
    details: Vec<FieldRow>,
}

impl SubmissionRow {
    fn from_document(doc: StoredDocument) -> Self {
        let text = |name: &str| {
            doc.fields
                .get(name)
                .map(FieldValue::display)
                .unwrap_or_default()
        };

        let status = text(fields::STATUS);
        let is_pending = matches!(SubmissionStatus::parse(&status), Some(SubmissionStatus::Pending));
        let user_email = Some(text(fields::USER_EMAIL))
            .filter(|email| !email.is_empty())
            .unwrap_or_else(|| UNKNOWN_EMAIL.to_string());

        let details = doc
            .fields
            .iter()
            .filter(|(name, _)| !STAMPED_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| FieldRow {
                name: name.clone(),
                value: value.display(),
            })
            .collect();

        Self {
            rejection_reason: text(fields::REJECTION_REASON),
            submitted_at: text(fields::TIMESTAMP),
            status,
            is_pending,
            user_email,
            details,
            doc_id: doc.id,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET / - The public landing page
pub async fn index_handler(
    State(state): State<Arc<AppState>>,
    OptionalAdmin(admin): OptionalAdmin,
) -> Result<Html<String>, ApiError> {
    let web_api_key = state.config.firebase_web_api_key.as_deref().unwrap_or_default();
    let project_id = state.project_id.as_deref().unwrap_or_default();

    let page = IndexTemplate {
        project_id,
        web_api_key,
        has_firebase_config: !project_id.is_empty() && !web_api_key.is_empty(),
        is_admin: admin.is_some(),
        categories: &SERVICE_CATEGORIES,
    };
    Ok(Html(page.render()?))
}

#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    view: Option<String>,
}

/// GET /admin - The admin panel
pub async fn admin_handler(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Query(params): Query<AdminQuery>,
) -> Result<Html<String>, ApiError> {
    let store = state.store()?;
    let view = AdminView::parse(params.view.as_deref());

    let mut collection = "";
    let mut rows = Vec::new();
    if let Some((name, query)) = view.query() {
        collection = name;
        match store.query(name, &query).await {
            Ok(docs) => rows = docs.into_iter().map(SubmissionRow::from_document).collect(),
            Err(e) => error!("Error fetching data for admin panel: {}", e),
        }
    }
    info!("{} viewing {} ({} rows)", admin.email, view.name(), rows.len());

    let categories = SERVICE_CATEGORIES
        .iter()
        .map(|&name| CategoryLink {
            name,
            href: format!("/admin?view={}", urlencoding::encode(name)),
            active: view == AdminView::Category(name),
        })
        .collect();

    let page = AdminTemplate {
        admin_email: &admin.email,
        current_view: view.name(),
        is_dashboard: view == AdminView::Dashboard,
        collection,
        consultations_active: view == AdminView::Consultations,
        categories,
        rows,
    };
    Ok(Html(page.render()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use chrono::{TimeZone, Utc};
    use testresult::TestResult;
    use velgo_core::value::Document;

    use crate::web::test_helpers::{admin_cookie, send, text_body, TestApp, ADMIN_EMAIL};

    fn submission(service: &str, day: u32, note: &str) -> Document {
        Document::from([
            ("service".to_string(), FieldValue::from(service)),
            ("note".to_string(), FieldValue::from(note)),
            ("status".to_string(), FieldValue::from("pending")),
            ("rejection_reason".to_string(), FieldValue::Null),
            ("user_email".to_string(), FieldValue::from("farmer@example.com")),
            (
                "timestamp".to_string(),
                FieldValue::Timestamp(Utc.with_ymd_and_hms(2025, 1, day, 9, 30, 0).unwrap()),
            ),
        ])
    }

    async fn admin_page(app: &TestApp, uri: &str) -> TestResult<(StatusCode, String)> {
        let cookie = admin_cookie(app).await?;
        let request = Request::get(uri).header(header::COOKIE, &cookie).body(Body::empty())?;
        let response = send(&app.router, request).await;
        let status = response.status();
        Ok((status, text_body(response).await?))
    }

    #[tokio::test]
    async fn admin_without_session_redirects_home() -> TestResult {
        let app = TestApp::new().await;

        let response = send(&app.router, Request::get("/admin").body(Body::empty())?).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
        Ok(())
    }

    #[tokio::test]
    async fn dashboard_shows_navigation_and_email() -> TestResult {
        let app = TestApp::new().await;
        app.store.put("bookings", "b1", submission("Soil Testing", 1, "north field")).await;

        let (status, html) = admin_page(&app, "/admin").await?;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains(ADMIN_EMAIL));
        assert!(html.contains("/admin?view=Soil%20Testing"));
        assert!(html.contains("/admin?view=AI%20%26%20IoT%20Farming"));
        assert!(!html.contains("north field"));
        Ok(())
    }

    #[tokio::test]
    async fn category_view_lists_matching_bookings_newest_first() -> TestResult {
        let app = TestApp::new().await;
        app.store.put("bookings", "b-old", submission("Soil Testing", 1, "older visit")).await;
        app.store.put("bookings", "b-new", submission("Soil Testing", 8, "newer visit")).await;
        app.store.put("bookings", "b-crop", submission("Crop Planning", 5, "crop rotation")).await;

        let (status, html) = admin_page(&app, "/admin?view=Soil%20Testing").await?;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("b-old"));
        assert!(html.contains("b-new"));
        assert!(!html.contains("b-crop"));
        assert!(!html.contains("crop rotation"));
        let newer = html.find("newer visit").ok_or("newer booking missing")?;
        let older = html.find("older visit").ok_or("older booking missing")?;
        assert!(newer < older);
        assert!(html.contains("2025-01-08 09:30"));
        Ok(())
    }

    #[tokio::test]
    async fn consultations_view_lists_consultations() -> TestResult {
        let app = TestApp::new().await;
        app.store.put("consultations", "c1", submission("Agri Consulting", 2, "pest advice")).await;
        app.store.put("bookings", "b1", submission("Agri Consulting", 3, "booked visit")).await;

        let (status, html) = admin_page(&app, "/admin?view=consultations").await?;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("pest advice"));
        assert!(!html.contains("booked visit"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_view_renders_empty_list() -> TestResult {
        let app = TestApp::new().await;
        app.store.put("bookings", "b1", submission("Soil Testing", 1, "north field")).await;

        let (status, html) = admin_page(&app, "/admin?view=users").await?;

        assert_eq!(status, StatusCode::OK);
        assert!(!html.contains("north field"));
        Ok(())
    }

    #[tokio::test]
    async fn store_errors_render_an_empty_list() -> TestResult {
        let app = TestApp::with_failing_queries().await;
        app.store.put("bookings", "b1", submission("Soil Testing", 1, "north field")).await;

        let (status, html) = admin_page(&app, "/admin?view=Soil%20Testing").await?;

        assert_eq!(status, StatusCode::OK);
        assert!(!html.contains("north field"));
        assert!(html.contains("No submissions to show."));
        Ok(())
    }

    #[tokio::test]
    async fn landing_page_carries_web_config() -> TestResult {
        let app = TestApp::new().await;

        let response = send(&app.router, Request::get("/").body(Body::empty())?).await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = text_body(response).await?;
        assert!(html.contains("velgo-test"));
        assert!(html.contains("test-web-api-key"));
        Ok(())
    }

    #[test]
    fn rows_split_stamped_fields_from_details() {
        let mut fields = submission("Soil Testing", 1, "north field");
        fields.remove("user_email");
        let row = SubmissionRow::from_document(StoredDocument {
            id: "b1".into(),
            fields,
        });

        assert!(row.is_pending);
        assert_eq!(row.user_email, UNKNOWN_EMAIL);
        assert_eq!(row.submitted_at, "2025-01-01 09:30");
        let names: Vec<&str> = row.details.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["note", "service"]);
    }
}
