//! Token management API endpoints.
//!
//! Thin HTTP surface over the [`LifecycleManager`]: listing, reading (with
//! refresh), manual injection, forced refresh and disconnect of per-user
//! provider tokens. The OAuth consent flow that produces tokens lives
//! elsewhere; callers hand the results to `PUT /api/tokens/:provider`.

use crate::credentials::CredentialRecord;
use crate::lifecycle::{LifecycleManager, ManagerStats, TokenError};
use crate::providers::is_supported_provider;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(test)]
mod tests;

/// Shared application state for the token API
#[derive(Clone)]
pub struct TokenAppState {
    pub manager: Arc<LifecycleManager>,
}

/// `?user_id=` query parameter
#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

/// Response for GET /api/tokens
#[derive(Serialize)]
pub struct ListTokensResponse {
    pub user_id: String,
    pub tokens: HashMap<String, CredentialRecord>,
}

/// Request body for PUT /api/tokens/:provider
#[derive(Deserialize)]
pub struct SaveTokenRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absolute expiry; takes precedence over `expires_in`
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Lifetime in seconds from now
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl SaveTokenRequest {
    fn into_record(self, provider_id: &str) -> Result<CredentialRecord, AppError> {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(expires_at), _) => Some(expires_at),
            (None, Some(secs)) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| AppError::BadRequest(format!("expires_in out of range: {}", secs)))?,
            ),
            (None, None) => None,
        };

        let mut record = CredentialRecord::new(provider_id, self.access_token);
        record.refresh_token = self.refresh_token.filter(|t| !t.is_empty());
        record.expires_at = expires_at;
        if let Some(token_type) = self.token_type.filter(|t| !t.is_empty()) {
            record.token_type = token_type;
        }
        Ok(record)
    }
}

/// Response for PUT and DELETE /api/tokens/:provider
#[derive(Serialize)]
pub struct TokenActionResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
}

#[derive(Serialize)]
pub struct InventoryResponse {
    pub records: usize,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create token API router
pub fn create_token_router(state: TokenAppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/tokens", get(list_tokens))
        .route(
            "/api/tokens/:provider",
            get(get_token).put(save_token).delete(delete_token),
        )
        .route("/api/tokens/:provider/refresh", post(refresh_token))
        .route("/debug/tokens", get(debug_tokens))
        .with_state(Arc::new(state))
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().timestamp(),
    })
}

/// GET /api/tokens?user_id= - All records for a user, as stored (no refresh)
async fn list_tokens(
    State(state): State<Arc<TokenAppState>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<ListTokensResponse>, AppError> {
    let user_id = require_user(params)?;
    debug!(user_id = %user_id, "Listing tokens");

    let tokens = state.manager.get_all(&user_id);
    Ok(Json(ListTokensResponse { user_id, tokens }))
}

/// GET /api/tokens/:provider?user_id= - Usable record, refreshed if stale
async fn get_token(
    State(state): State<Arc<TokenAppState>>,
    Path(provider): Path<String>,
    Query(params): Query<UserQuery>,
) -> Result<Json<CredentialRecord>, AppError> {
    require_supported(&provider)?;
    let user_id = require_user(params)?;

    let record = state.manager.get(&user_id, &provider).await?;
    Ok(Json(record))
}

/// PUT /api/tokens/:provider?user_id= - Store tokens from a completed OAuth flow
async fn save_token(
    State(state): State<Arc<TokenAppState>>,
    Path(provider): Path<String>,
    Query(params): Query<UserQuery>,
    Json(request): Json<SaveTokenRequest>,
) -> Result<Json<TokenActionResponse>, AppError> {
    require_supported(&provider)?;
    let user_id = require_user(params)?;

    if request.access_token.is_empty() {
        return Err(AppError::BadRequest("access_token must not be empty".to_string()));
    }

    let record = request.into_record(&provider)?;
    state.manager.save(&user_id, &provider, record);
    Ok(Json(TokenActionResponse { success: true }))
}

/// POST /api/tokens/:provider/refresh?user_id= - Force a refresh
async fn refresh_token(
    State(state): State<Arc<TokenAppState>>,
    Path(provider): Path<String>,
    Query(params): Query<UserQuery>,
) -> Result<Json<CredentialRecord>, AppError> {
    require_supported(&provider)?;
    let user_id = require_user(params)?;

    let record = state.manager.refresh(&user_id, &provider).await?;
    Ok(Json(record))
}

/// DELETE /api/tokens/:provider?user_id= - Disconnect a provider
///
/// Returns 404 if no credentials exist.
async fn delete_token(
    State(state): State<Arc<TokenAppState>>,
    Path(provider): Path<String>,
    Query(params): Query<UserQuery>,
) -> Result<Json<TokenActionResponse>, AppError> {
    require_supported(&provider)?;
    let user_id = require_user(params)?;

    if !state.manager.delete(&user_id, &provider) {
        return Err(AppError::NotFound(format!(
            "No credentials found for provider '{}'",
            provider
        )));
    }

    info!(user_id = %user_id, provider = %provider, "Provider disconnected");
    Ok(Json(TokenActionResponse { success: true }))
}

/// GET /api/stats
async fn stats(State(state): State<Arc<TokenAppState>>) -> Json<ManagerStats> {
    Json(state.manager.stats())
}

/// GET /debug/tokens - Log the credential inventory (no token values)
async fn debug_tokens(State(state): State<Arc<TokenAppState>>) -> Json<InventoryResponse> {
    let records = state.manager.log_inventory();
    Json(InventoryResponse { records })
}

fn require_user(params: UserQuery) -> Result<String, AppError> {
    params
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("user_id parameter is required".to_string()))
}

fn require_supported(provider: &str) -> Result<(), AppError> {
    if is_supported_provider(provider) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Unsupported provider '{}'", provider)))
    }
}

/// Application error types
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    /// Refresh impossible; the user must reconnect the provider
    Unauthorized(String),
    NotFound(String),
    BadGateway(String),
    ServiceUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::NotFound { .. } => AppError::NotFound(e.to_string()),
            TokenError::NoRefreshToken { .. } | TokenError::RefreshFailed { .. } => {
                AppError::Unauthorized(format!("{}; reconnect required", e))
            }
            TokenError::ProviderUnavailable { .. } => AppError::ServiceUnavailable(e.to_string()),
            TokenError::InvalidRefreshResult { .. } => AppError::BadGateway(e.to_string()),
        }
    }
}
