//! HTTP API
//! Mission: Expose auth, content and chat over a small axum surface

use crate::auth::{
    middleware::{auth_middleware, extract_claims},
    models::{LoginRequest, LoginResult},
    service::AuthService,
    token::TokenCodec,
};
use crate::content::{cache::ContentCache, chat::ChatClient, models::PortfolioData};
use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub cache: Arc<ContentCache>,
    pub codec: Arc<TokenCodec>,
    pub chat: Option<Arc<ChatClient>>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/me", get(current_subject))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/logout-all", post(logout_all))
        .route("/api/content/refresh", post(refresh_content))
        .route("/api/content/clear", post(clear_content))
        .route("/api/chat/retrain", get(chat_retrain))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.codec),
            auth_middleware,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/auth/session", get(session_status))
        .route("/api/auth/lockout", get(lockout_status))
        .route("/api/content", get(get_content))
        .route("/api/chat", post(chat_message))
        .route("/api/chat/health", get(chat_health))
        .route("/api/chat/search/:query", get(chat_search));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /api/auth/login
///
/// Failures carry the structured body (remaining attempts, lockout flag)
/// under a 423 for locked accounts and a 401 for everything else.
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Response {
    let result = state
        .auth
        .login(&payload.email, &payload.password, payload.remember)
        .await;

    let status = match (&result, result.is_locked) {
        (LoginResult { success: true, .. }, _) => StatusCode::OK,
        (_, true) => StatusCode::LOCKED,
        (_, false) => StatusCode::UNAUTHORIZED,
    };
    (status, Json(result)).into_response()
}

/// GET /api/auth/me — identity straight from the verified claims.
async fn current_subject(req: Request) -> Result<Json<serde_json::Value>, ApiError> {
    let claims = extract_claims(&req).ok_or(ApiError::NotAuthenticated)?;
    Ok(Json(json!({
        "id": claims.sub,
        "email": claims.email,
        "remember": claims.remember,
        "login_time_ms": claims.login_time_ms,
    })))
}

/// POST /api/auth/logout
async fn logout(State(state): State<AppState>) -> StatusCode {
    state.auth.logout().await;
    StatusCode::NO_CONTENT
}

/// POST /api/auth/logout-all
async fn logout_all(State(state): State<AppState>) -> StatusCode {
    state.auth.logout_all_devices().await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
struct SessionStatusResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<crate::auth::models::SubjectInfo>,
}

/// GET /api/auth/session
async fn session_status(State(state): State<AppState>) -> Json<SessionStatusResponse> {
    let restored = state.auth.check_existing_session().await;
    let snapshot = state.auth.snapshot();
    Json(SessionStatusResponse {
        authenticated: restored,
        subject: snapshot.subject,
    })
}

#[derive(Debug, Deserialize)]
struct LockoutQuery {
    email: String,
}

/// GET /api/auth/lockout?email=...
async fn lockout_status(
    State(state): State<AppState>,
    Query(query): Query<LockoutQuery>,
) -> Json<serde_json::Value> {
    let minutes = state.auth.remaining_lockout_minutes(&query.email).await;
    Json(json!({ "remaining_minutes": minutes, "is_locked": minutes > 0 }))
}

/// GET /api/content
async fn get_content(State(state): State<AppState>) -> Result<Json<PortfolioData>, ApiError> {
    let data = state.cache.load(false).await.map_err(|e| {
        warn!("Content load failed: {}", e);
        ApiError::ContentUnavailable
    })?;
    Ok(Json(data))
}

/// POST /api/content/refresh (admin)
async fn refresh_content(State(state): State<AppState>) -> Result<Json<PortfolioData>, ApiError> {
    let data = state.cache.load(true).await.map_err(|e| {
        warn!("Forced content refresh failed: {}", e);
        ApiError::ContentUnavailable
    })?;
    Ok(Json(data))
}

/// POST /api/content/clear (admin)
async fn clear_content(State(state): State<AppState>) -> StatusCode {
    state.cache.clear();
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct ChatMessageRequest {
    message: String,
}

/// POST /api/chat
async fn chat_message(
    State(state): State<AppState>,
    Json(payload): Json<ChatMessageRequest>,
) -> Result<Response, ApiError> {
    let chat = state.chat.as_ref().ok_or(ApiError::ChatNotConfigured)?;
    if payload.message.trim().is_empty() {
        return Err(ApiError::EmptyMessage);
    }
    let reply = chat
        .send_message(&payload.message)
        .await
        .map_err(|_| ApiError::ChatUnavailable)?;
    Ok(Json(reply).into_response())
}

/// GET /api/chat/health
async fn chat_health(State(state): State<AppState>) -> Result<Response, ApiError> {
    let chat = state.chat.as_ref().ok_or(ApiError::ChatNotConfigured)?;
    let status = chat.health().await.map_err(|_| ApiError::ChatUnavailable)?;
    Ok(Json(status).into_response())
}

/// GET /api/chat/search/:query
async fn chat_search(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chat = state.chat.as_ref().ok_or(ApiError::ChatNotConfigured)?;
    let results = chat
        .search(&query)
        .await
        .map_err(|_| ApiError::ChatUnavailable)?;
    Ok(Json(results))
}

/// GET /api/chat/retrain (admin)
async fn chat_retrain(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let chat = state.chat.as_ref().ok_or(ApiError::ChatNotConfigured)?;
    let result = chat
        .retrain()
        .await
        .map_err(|_| ApiError::ChatUnavailable)?;
    Ok(Json(result))
}

/// API errors with stable client-facing messages.
#[derive(Debug)]
pub enum ApiError {
    NotAuthenticated,
    ContentUnavailable,
    ChatNotConfigured,
    ChatUnavailable,
    EmptyMessage,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotAuthenticated => {
                (StatusCode::UNAUTHORIZED, "Authentication required")
            }
            ApiError::ContentUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Portfolio content is unavailable",
            ),
            ApiError::ChatNotConfigured => {
                (StatusCode::SERVICE_UNAVAILABLE, "Chat is not configured")
            }
            ApiError::ChatUnavailable => (StatusCode::BAD_GATEWAY, "Chat service is unavailable"),
            ApiError::EmptyMessage => (StatusCode::BAD_REQUEST, "Message cannot be empty"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_statuses() {
        assert_eq!(
            ApiError::ContentUnavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::ChatNotConfigured.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::ChatUnavailable.into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::EmptyMessage.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
