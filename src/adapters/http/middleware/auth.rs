//! Identity middleware and extractor for axum.
//!
//! Authentication happens upstream. The auth gateway forwards the caller as
//! `X-User-Id` / `X-User-Email` (and optionally `X-User-Name`) headers; this
//! module turns them into an `AuthenticatedUser`.
//!
//! ```text
//! Request → identity_middleware → injects AuthenticatedUser into extensions
//!                                          ↓
//!                                  Handler → RequireAuth reads from extensions
//! ```

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AuthError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()))
            .map_err(|_| AuthError::InvalidIdentity(format!("{name} is not valid text"))),
    }
}

/// Reads the forwarded identity.
///
/// Returns `Ok(None)` when no user id header is present and an error when
/// the headers are present but unusable.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<Option<AuthenticatedUser>, AuthError> {
    let Some(raw_id) = header(headers, USER_ID_HEADER)? else {
        return Ok(None);
    };
    let id = UserId::new(raw_id).map_err(|e| AuthError::InvalidIdentity(e.to_string()))?;

    let email = header(headers, USER_EMAIL_HEADER)?.ok_or(AuthError::MissingIdentity)?;
    if !email.contains('@') {
        return Err(AuthError::InvalidIdentity(format!(
            "{USER_EMAIL_HEADER} is not an email address"
        )));
    }
    let name = header(headers, USER_NAME_HEADER)?
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(Some(AuthenticatedUser::new(id, email, name)))
}

/// Injects the caller into request extensions.
///
/// Requests without identity headers pass through untouched; handlers that
/// need a caller use `RequireAuth`. Malformed identity headers are rejected
/// with 401.
pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    match identity_from_headers(request.headers()) {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected malformed identity headers");
            AuthRejection::Invalid(e.to_string()).into_response()
        }
    }
}

/// Extractor that requires a caller.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(RequireAuth)
            .ok_or(AuthRejection::Unauthenticated)
    }
}

/// Rejection type for identity failures.
#[derive(Debug, Clone)]
pub enum AuthRejection {
    /// No identity was forwarded.
    Unauthenticated,
    /// Identity headers were present but malformed.
    Invalid(String),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            AuthRejection::Unauthenticated => "Authentication required".to_string(),
            AuthRejection::Invalid(reason) => reason,
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "success": false,
                "error": "unauthenticated",
                "message": message,
            })),
        )
            .into_response()
    }
}
