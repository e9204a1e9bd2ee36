//! Request authentication.
//!
//! Users present `Authorization: Bearer demo-token-user-<uuid>`; devices
//! present `X-Device-Key: device-key-<anything>`. Both are placeholder schemes
//! that only identify the caller.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::AppError;

const USER_TOKEN_PREFIX: &str = "demo-token-user-";
const DEVICE_KEY_HEADER: &str = "x-device-key";
const DEVICE_KEY_PREFIX: &str = "device-key-";

/// The authenticated user of a request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

pub fn token_for(user_id: Uuid) -> String {
    format!("{}{}", USER_TOKEN_PREFIX, user_id)
}

fn parse_bearer(header: &str) -> Option<Uuid> {
    let token = header.strip_prefix("Bearer ")?.trim();
    token.strip_prefix(USER_TOKEN_PREFIX)?.parse().ok()
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
        let user_id = parse_bearer(header)
            .ok_or_else(|| AppError::Unauthorized("invalid bearer token".to_string()))?;
        Ok(AuthUser { user_id })
    }
}

/// Marker for requests carrying a device key.
#[derive(Debug, Clone, Copy)]
pub struct DeviceKey;

#[async_trait]
impl<S> FromRequestParts<S> for DeviceKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts
            .headers
            .get(DEVICE_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(key) if key.starts_with(DEVICE_KEY_PREFIX) && key.len() > DEVICE_KEY_PREFIX.len() => {
                Ok(DeviceKey)
            }
            _ => Err(AppError::Unauthorized("missing or invalid device key".to_string())),
        }
    }
}

/// Hash a password off the async runtime.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| AppError::InternalError(format!("hash task failed: {}", e)))?
        .map_err(|e| AppError::InternalError(format!("password hashing failed: {}", e)))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::InternalError(format!("verify task failed: {}", e)))?
        .map_err(|e| AppError::InternalError(format!("password verification failed: {}", e)))
}
