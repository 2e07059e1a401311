//! Authentication Middleware
//! Mission: Gate admin endpoints behind a verified bearer token

use crate::auth::{models::Claims, token::TokenCodec};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Middleware that validates the bearer token and stashes its claims.
pub async fn auth_middleware(
    State(codec): State<Arc<TokenCodec>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string())
        .ok_or(AuthError::MissingToken)?;

    // Any token failure reads as "not authenticated", nothing more specific.
    let claims = codec.verify(&token).ok_or(AuthError::InvalidToken)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Extract claims from a request (use after `auth_middleware`).
pub fn extract_claims(req: &Request) -> Option<&Claims> {
    req.extensions().get::<Claims>()
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => "Authentication required",
            AuthError::InvalidToken => "Authentication required",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}
