//! Bearer-token authentication: extract the caller's roles from a JWT.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Role required by the gated CRUD endpoints.
pub const ROLE_USER: &str = "user";

#[derive(Clone)]
pub struct AuthConfig {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthConfig {
    pub fn new(secret: &str) -> Self {
        AuthConfig {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
}

/// The authenticated caller.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn require_role(&self, role: &str) -> Result<(), AppError> {
        if self.roles.iter().any(|r| r == role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("requires role {}", role)))
        }
    }
}

/// Decode a bearer token into the caller. Split out of the extractor so it
/// can be exercised without building a request.
pub fn user_from_token(config: &AuthConfig, token: &str) -> Result<AuthUser, AppError> {
    let data = decode::<Claims>(token, &config.decoding_key, &config.validation)
        .map_err(|e| AppError::Unauthorized(format!("invalid token: {}", e)))?;
    Ok(AuthUser {
        id: data.claims.sub,
        roles: data.claims.roles,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        user_from_token(&config, token)
    }
}
