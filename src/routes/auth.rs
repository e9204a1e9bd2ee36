//! User registration and login.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{hash_password, token_for, verify_password, AuthUser};
use crate::db::models::User;
use crate::db::queries::{self, InsertUserParams, UpdateUserParams};
use crate::errors::{AppError, ErrorResponse};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Profile fields to change. Omitted fields stay as they are; an empty
/// phone number removes it.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    /// RFC 3339
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            phone_number: u.phone_number,
            created_at: u.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Send as `Authorization: Bearer <token>`
    pub token: String,
    pub user: UserResponse,
}

fn validate_registration(req: &RegisterRequest) -> Result<(), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    let email = req.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(AppError::BadRequest(format!("invalid email '{}'", email))),
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn validate_user_update(req: &UpdateUserRequest) -> Result<(), AppError> {
    if req.name.is_none() && req.phone_number.is_none() {
        return Err(AppError::BadRequest("No valid fields provided".to_string()));
    }
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    Ok(())
}

/// Register a new user.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Email or phone already registered", body = ErrorResponse),
    )
)]
pub async fn register(
    State(pool): State<PgPool>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    validate_registration(&req)?;
    let password_hash = hash_password(req.password.clone()).await?;

    let user = queries::insert_user(
        &pool,
        &InsertUserParams {
            name: req.name.trim(),
            email: req.email.trim(),
            phone_number: req.phone_number.as_deref().map(str::trim).filter(|p| !p.is_empty()),
            password_hash: &password_hash,
        },
    )
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "email or phone number already registered"))?;

    tracing::info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Log in with email and password.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
    )
)]
pub async fn login(
    State(pool): State<PgPool>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let invalid = || AppError::Unauthorized("invalid email or password".to_string());

    let user = queries::get_user_by_email(&pool, req.email.trim())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(req.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    Ok(Json(LoginResponse {
        token: token_for(user.id),
        user: user.into(),
    }))
}

/// The authenticated user.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn me(State(pool): State<PgPool>, auth: AuthUser) -> Result<Json<UserResponse>, AppError> {
    let user = queries::get_user(&pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;
    Ok(Json(user.into()))
}

/// Update the authenticated user's name or phone number.
#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    tag = "Users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "No fields or empty name", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 409, description = "Phone number already registered", body = ErrorResponse),
    )
)]
pub async fn update_me(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    validate_user_update(&req)?;

    let user = queries::update_user(
        &pool,
        auth.user_id,
        &UpdateUserParams {
            name: req.name.as_deref().map(str::trim),
            phone_number: req.phone_number.as_deref().map(str::trim),
        },
    )
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "phone number already registered"))?
    .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;

    tracing::info!("Updated profile of user {}", user.id);
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            phone_number: None,
            password: password.to_string(),
        }
    }

    #[test]
    fn test_validate_registration() {
        assert!(validate_registration(&req("Asha", "asha@example.in", "longenough")).is_ok());
        assert!(validate_registration(&req(" ", "asha@example.in", "longenough")).is_err());
        assert!(validate_registration(&req("Asha", "asha.example.in", "longenough")).is_err());
        assert!(validate_registration(&req("Asha", "@example.in", "longenough")).is_err());
        assert!(validate_registration(&req("Asha", "asha@example.in", "short")).is_err());
    }

    #[test]
    fn test_validate_user_update() {
        let update = |name: Option<&str>, phone: Option<&str>| UpdateUserRequest {
            name: name.map(str::to_string),
            phone_number: phone.map(str::to_string),
        };
        assert!(validate_user_update(&update(Some("Asha Patil"), None)).is_ok());
        assert!(validate_user_update(&update(None, Some(""))).is_ok());
        assert!(validate_user_update(&update(Some("  "), Some("9876543210"))).is_err());
        assert!(matches!(
            validate_user_update(&UpdateUserRequest::default()),
            Err(AppError::BadRequest(msg)) if msg == "No valid fields provided"
        ));
    }
}
