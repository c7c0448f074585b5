//! User management. All endpoints require the admin role.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt, validate_email};
use crate::auth::{AdminOnly, Auth, CookieSettings};
use crate::db::{
    NewUser, RefreshTokenStore, Role, StoreError, TenantStore, UserDirectory, UserStore,
    UserUpdate,
};
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;
use crate::password::PasswordHasher;

#[derive(Clone)]
pub struct UsersState {
    pub users: UserStore,
    pub tenants: TenantStore,
    pub passwords: PasswordHasher,
    pub codec: Arc<TokenCodec>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub cookies: CookieSettings,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user).patch(update_user).delete(delete_user))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    email: String,
    password: String,
    role: String,
    tenant_id: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    role: Option<String>,
    tenant_id: Option<i64>,
}

#[derive(Serialize)]
struct IdResponse {
    id: i64,
}

fn parse_role(role: &str) -> Result<Role, ApiError> {
    role.trim()
        .parse()
        .map_err(|_| ApiError::bad_request("Role must be one of: admin, manager, customer"))
}

/// Admins are tenant-independent; everyone else needs an existing tenant.
async fn check_tenant(
    tenants: &TenantStore,
    role: Role,
    tenant_id: Option<i64>,
) -> Result<Option<i64>, ApiError> {
    if !role.requires_tenant() {
        return Ok(tenant_id);
    }

    let tenant_id =
        tenant_id.ok_or_else(|| ApiError::bad_request("Tenant is required for this role"))?;
    tenants
        .get(tenant_id)
        .await
        .db_err("Failed to get tenant")?
        .ok_or_else(|| ApiError::bad_request("Tenant does not exist"))?;
    Ok(Some(tenant_id))
}

fn map_duplicate(e: StoreError, context: &str) -> ApiError {
    match e {
        StoreError::DuplicateEmail => ApiError::bad_request("Email already exists"),
        e => ApiError::db_error(context, e),
    }
}

async fn create_user(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&payload.email)?.to_string();
    if payload.password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }
    let role = parse_role(&payload.role)?;
    let tenant_id = check_tenant(&state.tenants, role, payload.tenant_id).await?;

    let password_hash = state
        .passwords
        .hash(&payload.password)
        .await
        .db_err("Failed to hash password")?;

    let user = state
        .users
        .create_user(&NewUser {
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            email,
            password_hash,
            role,
            tenant_id,
        })
        .await
        .map_err(|e| map_duplicate(e, "Failed to create user"))?;
    info!(user_id = user.id, role = %user.role, "User created");

    Ok((StatusCode::CREATED, Json(IdResponse { id: user.id })))
}

async fn list_users(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.users.list().await.db_err("Failed to list users")?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .users
        .get_by_id(id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(user))
}

/// Partial update: absent fields keep their current value.
///
/// A role or tenant change ends the user's sessions, since refresh tokens
/// carry the role they were issued with.
async fn update_user(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .users
        .get_by_id(id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let (previous_role, previous_tenant) = (current.role, current.tenant_id);

    let email = match &payload.email {
        Some(email) => validate_email(email)?.to_string(),
        None => current.email,
    };
    let role = match &payload.role {
        Some(role) => parse_role(role)?,
        None => current.role,
    };
    let tenant_id = check_tenant(
        &state.tenants,
        role,
        payload.tenant_id.or(current.tenant_id),
    )
    .await?;

    let update = UserUpdate {
        first_name: payload
            .first_name
            .map(|s| s.trim().to_string())
            .unwrap_or(current.first_name),
        last_name: payload
            .last_name
            .map(|s| s.trim().to_string())
            .unwrap_or(current.last_name),
        email,
        role,
        tenant_id,
    };

    let updated = state
        .users
        .update(id, &update)
        .await
        .map_err(|e| map_duplicate(e, "Failed to update user"))?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    if role != previous_role || tenant_id != previous_tenant {
        let revoked = state
            .refresh_tokens
            .delete_for_user(id)
            .await
            .db_err("Failed to revoke refresh tokens")?;
        info!(user_id = id, revoked, "Sessions ended after role or tenant change");
    }
    info!(user_id = id, role = %role, "User updated");

    Ok(Json(IdResponse { id }))
}

/// Delete a user. Their refresh tokens go with them, so existing sessions end.
async fn delete_user(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .users
        .delete(id)
        .await
        .db_err("Failed to delete user")?;
    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }
    info!(user_id = id, "User deleted");

    Ok(Json(IdResponse { id }))
}
