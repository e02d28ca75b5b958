//! Request extractors: bearer-token auth and JSON-error wrappers around
//! axum's body/path/query extractors.

use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use plt_auth::Claims;

use crate::{error::ApiError, state::AppState};

/// `axum::Json` whose rejection is an [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Path` whose rejection is an [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// `axum::extract::Query` whose rejection is an [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub fn verify_token(state: &AppState, token: Option<&str>) -> Result<Claims, ApiError> {
    let token = token.ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
    state
        .tokens
        .verify(token)
        .map_err(|_| ApiError::Unauthorized("invalid or expired token".to_string()))
}

pub fn require_admin(claims: Claims) -> Result<Claims, ApiError> {
    claims
        .require_admin()
        .map_err(|e| ApiError::Forbidden(e.to_string()))?;
    Ok(claims)
}

/// Any signed-in user.
pub struct AuthUser(pub Claims);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        verify_token(state, bearer_token(&parts.headers)).map(AuthUser)
    }
}

/// Signed-in user with the admin role.
pub struct AdminUser(pub Claims);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = verify_token(state, bearer_token(&parts.headers))?;
        require_admin(claims).map(AdminUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut h = HeaderMap::new();
        assert_eq!(bearer_token(&h), None);

        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&h), Some("abc.def"));

        h.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(bearer_token(&h), Some("xyz"));

        h.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(bearer_token(&h), None);

        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&h), None);
    }

    #[test]
    fn non_admin_claims_are_forbidden() {
        let claims = |role| Claims {
            sub: uuid::Uuid::new_v4(),
            role,
            iat: 0,
            exp: 1,
        };
        assert!(require_admin(claims(plt_schemas::Role::Admin)).is_ok());
        match require_admin(claims(plt_schemas::Role::Customer)) {
            Err(e @ ApiError::Forbidden(_)) => {
                assert_eq!(e.code(), "FORBIDDEN");
                assert_eq!(e.to_string(), "admin role required");
            }
            other => panic!("expected forbidden, got {:?}", other.map(|c| c.role)),
        }
    }
}
