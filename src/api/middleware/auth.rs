//! Bearer token authentication middleware

use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Pull the token out of `Authorization: Bearer <token>`
///
/// Browsers cannot set headers on a WebSocket upgrade, so a `token` query parameter is
/// accepted as well.
fn presented_token(request: &Request<Body>) -> Result<&str, AuthError> {
    if let Some(header) = request.headers().get(AUTHORIZATION) {
        let value = header.to_str().map_err(|_| AuthError::InvalidFormat)?;
        return value
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat);
    }

    request
        .uri()
        .query()
        .and_then(|query| {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("token="))
        })
        .ok_or(AuthError::MissingToken)
}

/// Reject requests that do not carry the expected token
pub async fn auth_middleware(
    State(expected_token): State<String>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = presented_token(&request)?;

    if token != expected_token {
        debug!("rejected request to {} with invalid token", request.uri().path());
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

/// Authentication errors
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing Authorization header"),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization format (expected: Bearer <token>)",
            ),
            AuthError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid token"),
        };

        (status, message).into_response()
    }
}
