//! Account endpoints: registration, login, listing, presence update.
//! Register and login are the only public REST routes; both issue an
//! access token. Credentials are argon2 hashes, checked here and nowhere
//! else.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::auth::{jwt, password};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::models::{User, UserView};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub is_online: bool,
}

/// POST /register — create an account and issue a token.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let name = body.name.trim().to_string();
    if name.is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation(
            "name and password are required".into(),
        ));
    }

    let hash = password::hash_password(&body.password)?;
    let user = state
        .store
        .mutate(move |s| {
            if s.users.iter().any(|u| u.name == name) {
                return Err(ApiError::Validation("username already taken".into()));
            }
            let user = User::new(name, hash);
            s.users.push(user.clone());
            Ok(user)
        })
        .await?;

    let token = jwt::issue_access_token(&state.jwt_secret, &user.id, &user.name)
        .map_err(ApiError::internal)?;

    tracing::info!(user_id = %user.id, name = %user.name, "user registered");
    Ok(Json(AuthResponse {
        token,
        user: user.view(),
    }))
}

/// POST /login — verify credentials, flip the user online, issue a token.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let name = body.name.trim().to_string();
    let supplied = body.password;

    let user = state
        .store
        .mutate(move |s| {
            let user = s
                .users
                .iter_mut()
                .find(|u| u.name == name)
                .filter(|u| password::verify_password(&supplied, &u.password_hash))
                .ok_or_else(|| ApiError::Unauthorized("invalid name or password".into()))?;
            user.is_online = true;
            user.last_seen = Utc::now();
            Ok(user.clone())
        })
        .await?;

    let token = jwt::issue_access_token(&state.jwt_secret, &user.id, &user.name)
        .map_err(ApiError::internal)?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: user.view(),
    }))
}

/// GET /users — all users, public projection only.
pub async fn list_users(
    State(state): State<AppState>,
    _claims: Claims,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = state
        .store
        .read(|s| Ok(s.users.iter().map(User::view).collect()))
        .await?;
    Ok(Json(users))
}

/// PUT /users/{id} — update online flag and last-seen. Self only.
pub async fn update_user(
    State(state): State<AppState>,
    claims: Claims,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    if user_id != claims.sub {
        return Err(ApiError::PermissionDenied(
            "cannot update another user".into(),
        ));
    }
    let user = state
        .store
        .mutate(move |s| {
            let user = s.user_mut(&user_id).ok_or(ApiError::NotFound("user"))?;
            user.is_online = body.is_online;
            user.last_seen = Utc::now();
            Ok(user.clone())
        })
        .await?;
    Ok(Json(user.view()))
}
