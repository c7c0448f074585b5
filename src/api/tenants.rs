//! Tenant management. All endpoints require the admin role.

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

use super::error::{ApiError, ResultExt};
use crate::auth::{AdminOnly, Auth, CookieSettings};
use crate::db::{RefreshTokenStore, TenantStore};
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;

#[derive(Clone)]
pub struct TenantsState {
    pub tenants: TenantStore,
    pub codec: Arc<TokenCodec>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub cookies: CookieSettings,
}

impl_has_auth_backend!(TenantsState);

pub fn router(state: TenantsState) -> Router {
    Router::new()
        .route("/", get(list_tenants).post(create_tenant))
        .route(
            "/{id}",
            get(get_tenant).patch(update_tenant).delete(delete_tenant),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct TenantRequest {
    name: String,
    address: String,
}

impl TenantRequest {
    fn validate(&self) -> Result<(&str, &str), ApiError> {
        let name = self.name.trim();
        let address = self.address.trim();
        if name.is_empty() {
            return Err(ApiError::bad_request("Tenant name is required"));
        }
        if address.is_empty() {
            return Err(ApiError::bad_request("Tenant address is required"));
        }
        if name.len() > 100 {
            return Err(ApiError::bad_request("Tenant name is too long"));
        }
        if address.len() > 255 {
            return Err(ApiError::bad_request("Tenant address is too long"));
        }
        Ok((name, address))
    }
}

#[derive(Serialize)]
struct IdResponse {
    id: i64,
}

async fn create_tenant(
    State(state): State<TenantsState>,
    _auth: Auth<AdminOnly>,
    Json(payload): Json<TenantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (name, address) = payload.validate()?;

    let tenant = state
        .tenants
        .create(name, address)
        .await
        .db_err("Failed to create tenant")?;
    info!(tenant_id = tenant.id, "Tenant created");

    Ok((StatusCode::CREATED, Json(IdResponse { id: tenant.id })))
}

async fn list_tenants(
    State(state): State<TenantsState>,
    _auth: Auth<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let tenants = state
        .tenants
        .list()
        .await
        .db_err("Failed to list tenants")?;

    Ok(Json(tenants))
}

async fn get_tenant(
    State(state): State<TenantsState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state
        .tenants
        .get(id)
        .await
        .db_err("Failed to get tenant")?
        .ok_or_else(|| ApiError::not_found("Tenant not found"))?;

    Ok(Json(tenant))
}

async fn update_tenant(
    State(state): State<TenantsState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<i64>,
    Json(payload): Json<TenantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (name, address) = payload.validate()?;

    let updated = state
        .tenants
        .update(id, name, address)
        .await
        .db_err("Failed to update tenant")?;
    if !updated {
        return Err(ApiError::not_found("Tenant not found"));
    }
    info!(tenant_id = id, "Tenant updated");

    Ok(Json(IdResponse { id }))
}

async fn delete_tenant(
    State(state): State<TenantsState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .tenants
        .delete(id)
        .await
        .db_err("Failed to delete tenant")?;
    if !deleted {
        return Err(ApiError::not_found("Tenant not found"));
    }
    info!(tenant_id = id, "Tenant deleted");

    Ok(Json(IdResponse { id }))
}
