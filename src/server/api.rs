//! HTTP auth endpoints of the development server

use crate::auth::{AuthResponse, DevToken, LoginRequest, RegisterRequest};
use crate::server::accounts::AccountError;
use crate::server::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

/// Error body returned by the auth endpoints
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn issue(state: &AppState, user: crate::session::User) -> Result<Json<AuthResponse>, ApiError> {
    let token = DevToken::create(&user.id, user.role, &state.token_secret)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(AuthResponse {
        user,
        token: token.as_str().to_string(),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    match state.accounts.verify(&request.email, &request.password) {
        Some(user) => {
            info!(user_id = %user.id, "Login");
            issue(&state, user)
        }
        None => {
            warn!(email = %request.email, "Login rejected");
            Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid email or password"))
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    match state.accounts.register(&request) {
        Ok(user) => {
            info!(user_id = %user.id, role = %user.role, "Registered");
            issue(&state, user)
        }
        Err(e @ AccountError::AlreadyExists(_)) => {
            warn!(email = %request.email, "Registration rejected");
            Err(ApiError::new(StatusCode::CONFLICT, e.to_string()))
        }
    }
}

fn bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "missing bearer token"))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    match DevToken::parse(bearer(&headers)?, &state.token_secret) {
        Ok(token) => {
            info!(user_id = %token.user_id(), "Logout");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            warn!(error = %e, "Logout with invalid token");
            Err(ApiError::new(StatusCode::UNAUTHORIZED, e.to_string()))
        }
    }
}

/// Reissue a token for the account named by a valid bearer token
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AuthResponse>, ApiError> {
    let token = DevToken::parse(bearer(&headers)?, &state.token_secret).map_err(|e| {
        warn!(error = %e, "Refresh with invalid token");
        ApiError::new(StatusCode::UNAUTHORIZED, e.to_string())
    })?;

    match state.accounts.find_by_id(token.user_id()) {
        Some(user) => {
            info!(user_id = %user.id, "Token refreshed");
            issue(&state, user)
        }
        None => {
            warn!(user_id = %token.user_id(), "Refresh for unknown account");
            Err(ApiError::new(StatusCode::UNAUTHORIZED, "unknown account"))
        }
    }
}
