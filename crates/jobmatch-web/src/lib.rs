//! Axum JSON API for the job board: thin handlers over the data access
//! layer plus the daily-update webhook.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use jobmatch_core::OpportunityFilters;
use jobmatch_store::{OpportunityStore, Served, ServedBy, StoreError};
use jobmatch_update::UpdatePipeline;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobmatch-web";

/// Which backing store served a read response; bodies stay unchanged.
pub const DATA_SOURCE_HEADER: &str = "x-data-source";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<OpportunityStore>,
    pub pipeline: Arc<UpdatePipeline>,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<OpportunityStore>,
        pipeline: Arc<UpdatePipeline>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            pipeline,
            webhook_secret,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Opportunity not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Opportunity not found"})),
            )
                .into_response(),
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Unauthorized"})),
            )
                .into_response(),
            ApiError::Internal(err) => {
                error!(error = %err, "unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error",
                        "message": err.to_string(),
                        "timestamp": Utc::now().to_rfc3339(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/opportunities", get(list_opportunities_handler))
        .route("/opportunities/{id}", get(opportunity_by_id_handler))
        .route(
            "/opportunities/category/{category}",
            get(opportunities_by_category_handler),
        )
        .route("/companies", get(companies_handler))
        .route("/categories", get(categories_handler))
        .route("/stats", get(stats_handler))
        .route("/employer/register", post(employer_register_handler))
        .route(
            "/webhook/daily-update",
            get(webhook_probe_handler).post(webhook_update_handler),
        )
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn served_json<T: Serialize>(source: ServedBy, body: T) -> Response {
    let mut response = Json(body).into_response();
    response.headers_mut().insert(
        header::HeaderName::from_static(DATA_SOURCE_HEADER),
        header::HeaderValue::from_static(source.as_str()),
    );
    response
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct OpportunitiesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subcategory: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    employment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<String>,
}

impl OpportunitiesQuery {
    fn filters(&self) -> OpportunityFilters {
        OpportunityFilters {
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            employment_type: self.employment_type.clone(),
            company: self.company.clone(),
        }
    }
}

/// `search` takes precedence over the attribute filters when both appear.
async fn list_opportunities_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OpportunitiesQuery>,
) -> Response {
    let served = match query.search.as_deref().filter(|s| !s.is_empty()) {
        Some(search) => state.store.search(search).await,
        None => state.store.get_all(&query.filters()).await,
    };
    let total = served.value.len();
    served_json(
        served.source,
        json!({
            "opportunities": served.value,
            "total": total,
            "filters": query,
        }),
    )
}

async fn opportunity_by_id_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, ApiError> {
    let served = state.store.get_by_id(&id).await?;
    Ok(served_json(served.source, served.value))
}

async fn opportunities_by_category_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(category): AxumPath<String>,
) -> Response {
    let served = state.store.get_by_category(&category).await;
    let total = served.value.len();
    served_json(
        served.source,
        json!({
            "category": category,
            "opportunities": served.value,
            "total": total,
        }),
    )
}

async fn companies_handler(State(state): State<Arc<AppState>>) -> Response {
    let served = state.store.get_companies().await;
    served_json(served.source, served.value)
}

#[derive(Debug, Serialize)]
struct CategorySummary {
    name: String,
    tags: Vec<String>,
}

async fn categories_handler(State(state): State<Arc<AppState>>) -> Response {
    let Served { value, source } = state.store.get_categories().await;
    let summaries: Vec<CategorySummary> = value
        .into_iter()
        .map(|category| CategorySummary {
            name: category.name,
            tags: category.subcategories,
        })
        .collect();
    served_json(source, summaries)
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Response {
    let served = state.store.get_stats().await;
    served_json(served.source, served.value)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EmployerRegistration {
    company_name: String,
    contact_name: String,
    email: String,
    phone: Option<String>,
    website: Option<String>,
    industry: String,
    company_size: String,
    location: String,
    description: String,
    job_posting_needs: String,
    urgency: String,
    agreed_to_terms: bool,
}

impl EmployerRegistration {
    fn validate(&self) -> Result<(), ApiError> {
        let mut missing = Vec::new();
        for (field, value) in [
            ("companyName", &self.company_name),
            ("contactName", &self.contact_name),
            ("email", &self.email),
            ("industry", &self.industry),
            ("companySize", &self.company_size),
            ("location", &self.location),
            ("description", &self.description),
            ("jobPostingNeeds", &self.job_posting_needs),
            ("urgency", &self.urgency),
        ] {
            if value.trim().is_empty() {
                missing.push(field);
            }
        }
        if !self.agreed_to_terms {
            missing.push("agreedToTerms");
        }
        if !missing.is_empty() {
            return Err(ApiError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        if !is_plausible_email(&self.email) {
            return Err(ApiError::Validation("Invalid email format".to_string()));
        }
        Ok(())
    }
}

/// `local@domain.tld` shape with no whitespace; nothing stricter.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Registrations are acknowledged and logged for manual review; nothing is
/// persisted.
async fn employer_register_handler(
    State(_state): State<Arc<AppState>>,
    Json(form): Json<EmployerRegistration>,
) -> Result<Response, ApiError> {
    form.validate()?;

    let registration_id = format!("emp_{}", Uuid::new_v4().simple());
    info!(
        company = %form.company_name,
        contact = %form.contact_name,
        email = %form.email,
        phone = form.phone.as_deref().unwrap_or("-"),
        website = form.website.as_deref().unwrap_or("-"),
        industry = %form.industry,
        urgency = %form.urgency,
        id = %registration_id,
        "new employer registration"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Registration submitted successfully",
        "registrationId": registration_id,
        "status": "pending_review",
        "estimatedReviewTime": "24-48 hours",
    }))
    .into_response())
}

#[derive(Debug, Default, Deserialize)]
struct WebhookRequest {
    #[serde(default)]
    source: Option<String>,
}

/// Accepts any caller unless a secret is configured; the body is optional
/// and only consulted for a `source` label.
async fn webhook_update_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers
            .get("x-webhook-secret")
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            return Err(ApiError::Unauthorized);
        }
    }

    let source = serde_json::from_str::<WebhookRequest>(&body)
        .ok()
        .and_then(|request| request.source)
        .unwrap_or_else(|| "webhook".to_string());
    info!(%source, "daily update webhook called");

    let summary = state.pipeline.run_once(state.store.pool(), &source).await;
    Ok(Json(json!({
        "success": true,
        "message": "Daily update webhook processed successfully",
        "opportunities_updated": summary.opportunities_updated,
        "timestamp": summary.timestamp.to_rfc3339(),
        "source": summary.source,
    }))
    .into_response())
}

async fn webhook_probe_handler() -> Response {
    Json(json!({
        "message": "Daily update webhook endpoint is active",
        "timestamp": Utc::now().to_rfc3339(),
        "status": "ready",
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::TimeZone;
    use http_body_util::BodyExt;
    use jobmatch_core::{Category, Opportunity};
    use jobmatch_store::FallbackStore;
    use jobmatch_update::SyntheticSource;
    use tower::ServiceExt;

    fn opportunity(id: &str, company: &str, category: &str, title: &str) -> Opportunity {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap();
        Opportunity {
            id: id.to_string(),
            company: company.to_string(),
            title: title.to_string(),
            category: category.to_string(),
            subcategory: Some("it".to_string()),
            employment_type: Some("full-time".to_string()),
            salary_range: Some("$100k - $140k".to_string()),
            url: None,
            location: Some("Remote".to_string()),
            skills: vec!["Rust".to_string(), "PostgreSQL".to_string()],
            experience: Some("3+ years".to_string()),
            description: "Build reliable data services.".to_string(),
            is_active: true,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn test_app(webhook_secret: Option<String>) -> Router {
        let fallback = FallbackStore::new(
            vec![
                opportunity("1", "TechCorp", "tech", "Backend Engineer"),
                opportunity("2", "DataDrive", "tech", "Data Scientist"),
                opportunity("3", "TechCorp", "career", "Engineering Intern"),
            ],
            vec![
                Category {
                    id: "tech".to_string(),
                    name: "tech".to_string(),
                    description: None,
                    subcategories: vec!["it".to_string(), "ai".to_string()],
                },
                Category {
                    id: "career".to_string(),
                    name: "career".to_string(),
                    description: None,
                    subcategories: vec!["internship".to_string()],
                },
            ],
        );
        let state = AppState::new(
            Arc::new(OpportunityStore::with_fallback_only(fallback)),
            Arc::new(UpdatePipeline::new(vec![Box::new(SyntheticSource)])),
            webhook_secret,
        );
        app(state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn list_returns_everything_with_total_and_source_header() {
        let app = test_app(None);
        let response = app
            .oneshot(Request::builder().uri("/opportunities").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[DATA_SOURCE_HEADER], "fallback");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["total"], 3);
        assert_eq!(body["opportunities"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn list_applies_filters_and_echoes_them() {
        let (status, body) =
            get_json(test_app(None), "/opportunities?category=tech&company=TechCorp").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["filters"]["category"], "tech");
        assert_eq!(body["filters"]["company"], "TechCorp");
    }

    #[tokio::test]
    async fn search_takes_precedence_over_filters() {
        // The category filter alone would match two records; the search term
        // narrows to the one whose title contains it.
        let (status, body) =
            get_json(test_app(None), "/opportunities?search=scientist&category=tech").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["opportunities"][0]["company"], "DataDrive");
    }

    #[tokio::test]
    async fn search_matches_skills_case_insensitively() {
        let (_, body) = get_json(test_app(None), "/opportunities?search=POSTGRESQL").await;
        assert_eq!(body["total"], 3);
    }

    #[tokio::test]
    async fn opportunity_by_id_roundtrips_and_misses_with_404() {
        let (status, body) = get_json(test_app(None), "/opportunities/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "2");
        assert_eq!(body["salaryRange"], "$100k - $140k");
        assert_eq!(body["type"], "full-time");

        let (status, body) = get_json(test_app(None), "/opportunities/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Opportunity not found");
    }

    #[tokio::test]
    async fn category_listing_reports_category_and_total() {
        let (status, body) = get_json(test_app(None), "/opportunities/category/tech").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category"], "tech");
        assert_eq!(body["total"], 2);
    }

    #[tokio::test]
    async fn companies_are_distinct() {
        let (status, body) = get_json(test_app(None), "/companies").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["TechCorp", "DataDrive"]));
    }

    #[tokio::test]
    async fn categories_expose_name_and_tags() {
        let (status, body) = get_json(test_app(None), "/categories").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "tech");
        assert_eq!(body[0]["tags"], json!(["it", "ai"]));
    }

    #[tokio::test]
    async fn stats_agree_with_the_listing() {
        let (status, body) = get_json(test_app(None), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalOpportunities"], 3);
        assert_eq!(body["totalCompanies"], 2);
        assert_eq!(body["totalCategories"], 2);
        assert_eq!(body["categoryCounts"]["tech"], 2);
    }

    fn registration_body() -> serde_json::Value {
        json!({
            "companyName": "TechCorp",
            "contactName": "Sam Doe",
            "email": "sam@techcorp.com",
            "industry": "Software",
            "companySize": "51-200",
            "location": "Remote",
            "description": "We build developer tools.",
            "jobPostingNeeds": "5-10 roles per quarter",
            "urgency": "this_month",
            "agreedToTerms": true,
        })
    }

    #[tokio::test]
    async fn employer_registration_succeeds() {
        let (status, body) =
            post_json(test_app(None), "/employer/register", registration_body()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "pending_review");
        assert!(body["registrationId"].as_str().unwrap().starts_with("emp_"));
    }

    #[tokio::test]
    async fn employer_registration_lists_missing_fields() {
        let mut body = registration_body();
        body["contactName"] = json!("");
        body.as_object_mut().unwrap().remove("urgency");
        body["agreedToTerms"] = json!(false);

        let (status, response) = post_json(test_app(None), "/employer/register", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = response["error"].as_str().unwrap();
        assert!(message.starts_with("Missing required fields:"));
        assert!(message.contains("contactName"));
        assert!(message.contains("urgency"));
        assert!(message.contains("agreedToTerms"));
    }

    #[tokio::test]
    async fn employer_registration_rejects_malformed_email() {
        let mut body = registration_body();
        body["email"] = json!("not-an-email");
        let (status, response) = post_json(test_app(None), "/employer/register", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "Invalid email format");
    }

    #[test]
    fn email_shape_checks() {
        assert!(is_plausible_email("a@b.co"));
        assert!(is_plausible_email("first.last@sub.domain.org"));
        assert!(!is_plausible_email("a b@c.co"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a@@b.co"));
    }

    #[tokio::test]
    async fn webhook_requires_secret_only_when_configured() {
        let (status, body) = post_json(
            test_app(Some("s3cret".to_string())),
            "/webhook/daily-update",
            json!({"source": "github_actions"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let app = test_app(Some("s3cret".to_string()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/daily-update")
                    .header("x-webhook-secret", "s3cret")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({"source": "github_actions"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["source"], "github_actions");
        let updated = body["opportunities_updated"].as_u64().unwrap();
        assert!((2..=4).contains(&updated));
    }

    #[tokio::test]
    async fn webhook_accepts_empty_body_without_secret() {
        let app = test_app(None);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/daily-update")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["source"], "webhook");
    }

    #[tokio::test]
    async fn webhook_probe_reports_ready() {
        let (status, body) = get_json(test_app(None), "/webhook/daily-update").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }
}
