//! HTTP basic-auth gate
//!
//! When credentials are configured nothing behind this middleware, WebSocket
//! upgrade included, is reachable without them.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Basic, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use remoto_core::Credentials;
use tracing::debug;

use crate::server::RelayState;

/// Realm announced in the `WWW-Authenticate` challenge
pub const REALM: &str = "Authorization Required";

/// Basic-auth middleware
pub async fn basic_auth_middleware(
    State(state): State<RelayState>,
    auth: Result<TypedHeader<Authorization<Basic>>, TypedHeaderRejection>,
    request: Request,
    next: Next,
) -> Response {
    let provided = auth
        .as_ref()
        .ok()
        .map(|TypedHeader(Authorization(basic))| (basic.username(), basic.password()));

    if validate_credentials(provided, state.credentials.as_deref()) {
        next.run(request).await
    } else {
        debug!("Rejecting unauthenticated request to {}", request.uri().path());
        unauthorized()
    }
}

/// Check a presented user/password pair against the configured one
pub fn validate_credentials(provided: Option<(&str, &str)>, expected: Option<&Credentials>) -> bool {
    match (provided, expected) {
        (_, None) => true,
        (Some((user, password)), Some(expected)) => expected.matches(user, password),
        (None, Some(_)) => false,
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", REALM))],
        "Unauthorized",
    )
        .into_response()
}
