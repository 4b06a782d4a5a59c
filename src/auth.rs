//! Bearer-JWT authentication.
//!
//! Protected endpoints expect `Authorization: Bearer <supabase_jwt>`. The
//! token is verified with the HS256 project secret; the `sub` claim becomes
//! the actor identity that scopes every data access. Supabase tokens carry an
//! `aud` claim, so audience validation is disabled.

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// HS256 secret shared with Supabase, injected into the router state
#[derive(Clone)]
pub struct JwtSecret(pub String);

/// Authenticated practitioner identity
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    email: Option<String>,
}

/// Verify an `Authorization` header value against the project secret
pub fn verify_bearer(header: &str, secret: &str) -> Result<AuthUser, ApiError> {
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".to_string()))?;

    if secret.is_empty() {
        return Err(ApiError::Internal("JWT secret not configured".to_string()));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| ApiError::Unauthorized(format!("Invalid token: {}", e)))?;

    let user_id = Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ApiError::Unauthorized("Missing sub claim".to_string()))?;

    Ok(AuthUser {
        user_id,
        email: data.claims.email,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtSecret: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let secret = JwtSecret::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".to_string()))?;

        verify_bearer(header, &secret.0)
    }
}
