//! Bearer-token authentication for customer-facing order endpoints.
//!
//! Identity management itself lives outside this service; we only validate
//! the JWT the storefront session layer issues and extract the owning user
//! id from it.

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Owning user id
    pub sub: String,
    /// Expiry (seconds since epoch)
    pub exp: usize,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing authorization header".into()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("Invalid authorization header".into()))?
            .trim();

        let claims = decode_token(token, &state.config.jwt_secret)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Invalid subject claim".into()))?;

        Ok(AuthenticatedUser { user_id })
    }
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| ServiceError::Unauthorized(format!("Invalid token: {}", e)))?;
    Ok(data.claims)
}

/// Issues a short-lived token for the given user. Used by tests and
/// operational tooling; production tokens come from the session layer.
pub fn issue_token(user_id: Uuid, secret: &str, ttl_secs: i64) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now().timestamp() + ttl_secs) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::Internal(format!("Failed to issue token: {}", e)))
}
