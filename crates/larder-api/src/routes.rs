use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use larder_core::db::{Database, SessionRepository, SqliteSessionRepository};
use larder_core::models::{SyncRecord, User};
use larder_core::sync::{Collections, Lists, Recipes, SyncFamily, SyncOrchestrator};
use larder_core::{SyncError, SyncRequest, SyncResponse};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, require_admin, session_token, token_fingerprint};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    db: Arc<Database>,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: Database) -> Self {
        Self {
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(config.as_ref())),
            db: Arc::new(db),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/sync/lists", post(sync_records::<Lists>))
        .route("/sync/recipes", post(sync_records::<Recipes>))
        .route("/sync/collections", post(sync_records::<Collections>))
        .route("/admin/users", post(create_user));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

async fn sync_records<F>(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncResponse<F::Record>>, AppError>
where
    F: SyncFamily + 'static,
    F::Record: 'static,
{
    let request = parse_sync_body::<F::Record>(&body)?;
    let body_token = request
        .as_ref()
        .and_then(|request| request.auth_token.as_deref());
    let token = session_token(&headers, body_token)?;

    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Sync, &token)
        .await?;

    let caller = token_fingerprint(&token);
    let db = Arc::clone(&state.db);
    let outcome = tokio::task::spawn_blocking(move || {
        let mut conn = db.connect()?;
        SyncOrchestrator::<F>::new().sync(&mut conn, &token, request)
    })
    .await
    .map_err(|error| AppError::internal(format!("Sync task failed: {error}")))?;

    match outcome {
        Ok(outcome) => {
            tracing::info!(
                endpoint = "sync",
                family = %<F::Record as SyncRecord>::KIND,
                caller,
                records = outcome.records.len(),
                permissions = outcome.permissions.len(),
                "Sync completed"
            );
            Ok(Json(SyncResponse::success(outcome)))
        }
        Err(error) => {
            tracing::warn!(
                endpoint = "sync",
                family = %<F::Record as SyncRecord>::KIND,
                caller,
                retryable = error.is_retryable(),
                "Sync failed: {error}"
            );
            Err(error.into())
        }
    }
}

/// Empty and `null` bodies decode to no request at all
fn parse_sync_body<R: DeserializeOwned>(body: &[u8]) -> Result<Option<SyncRequest<R>>, SyncError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map_err(|error| SyncError::InvalidRequest(format!("malformed JSON body: {error}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    id: Option<String>,
    display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserResponse {
    user: User,
    token: String,
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<CreateUserResponse>, AppError> {
    let presented = extract_bearer_token(&headers)?;
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Admin, presented)
        .await?;
    require_admin(&headers, state.config.admin_token.as_deref())?;

    let display_name = request.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(AppError::bad_request("`displayName` must not be empty"));
    }
    let user = match request.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => User::with_id(id, display_name),
        _ => User::new(display_name),
    };

    let db = Arc::clone(&state.db);
    let created = tokio::task::spawn_blocking(move || -> Result<CreateUserResponse, AppError> {
        let conn = db.connect().map_err(storage_error)?;
        let sessions = SqliteSessionRepository::new(&conn);
        if sessions.find_user(&user.id).map_err(storage_error)?.is_some() {
            return Err(AppError::bad_request(format!("user {} already exists", user.id)));
        }
        sessions.create_user(&user).map_err(storage_error)?;
        let token = sessions.issue_token(&user.id).map_err(storage_error)?;
        Ok(CreateUserResponse { user, token })
    })
    .await
    .map_err(|error| AppError::internal(format!("User task failed: {error}")))??;

    tracing::info!(
        endpoint = "admin_users",
        user = token_fingerprint(&created.user.id),
        "Created user and issued session token"
    );
    Ok(Json(created))
}

fn storage_error(error: larder_core::Error) -> AppError {
    match error {
        larder_core::Error::InvalidInput(message) => AppError::bad_request(message),
        other => AppError::internal(other.to_string()),
    }
}
