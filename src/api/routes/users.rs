//! User Routes
//!
//! - POST /api/v1/users/register - Create an account
//! - POST /api/v1/users/login - Exchange credentials for a bearer token

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{CredentialsRequest, LoginResponse, UserDto};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::blocking;
use crate::api::state::AppState;
use crate::auth::{hash_password, verify_password, AuthError};
use crate::store::{StoreError, User, UserStore};

fn validate(req: &CredentialsRequest) -> ApiResult<String> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "Username and password are required".to_string(),
        ));
    }
    Ok(username.to_string())
}

/// POST /api/v1/users/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<(StatusCode, Json<UserDto>)> {
    let username = validate(&req)?;
    let store = Arc::clone(&state.store);

    let user = blocking(move || {
        let hash = hash_password(&req.password)?;
        let user = User::new(username, hash);
        store.create_user(&user).map_err(|e| match e {
            StoreError::Conflict(_) => {
                ApiError::Conflict(format!("Username '{}' is already taken", user.username))
            }
            other => other.into(),
        })?;
        Ok(user)
    })
    .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    Ok((StatusCode::CREATED, Json(UserDto::from(&user))))
}

/// POST /api/v1/users/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let username = validate(&req)?;
    let store = Arc::clone(&state.store);

    let user = blocking(move || {
        let user = store
            .get_user_by_username(&username)?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&req.password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials.into());
        }
        Ok(user)
    })
    .await?;

    let token = state.authority.issue(&user.identity())?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: UserDto::from(&user),
    }))
}
