//! HTTP middleware for axum.
//!
//! - `auth` - Caller identity from the upstream auth gateway

pub mod auth;

pub use auth::{
    identity_from_headers, identity_middleware, AuthRejection, RequireAuth, USER_EMAIL_HEADER,
    USER_ID_HEADER, USER_NAME_HEADER,
};
