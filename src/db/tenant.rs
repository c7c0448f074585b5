use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct TenantStore {
    pool: SqlitePool,
}

impl TenantStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, address: &str) -> Result<Tenant, StoreError> {
        let tenant: Tenant = sqlx::query_as(
            "INSERT INTO tenants (name, address) VALUES (?, ?) RETURNING id, name, address, created_at",
        )
        .bind(name)
        .bind(address)
        .fetch_one(&self.pool)
        .await?;
        Ok(tenant)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Tenant>, StoreError> {
        let tenant: Option<Tenant> =
            sqlx::query_as("SELECT id, name, address, created_at FROM tenants WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(tenant)
    }

    pub async fn list(&self) -> Result<Vec<Tenant>, StoreError> {
        let tenants: Vec<Tenant> =
            sqlx::query_as("SELECT id, name, address, created_at FROM tenants ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(tenants)
    }

    /// Returns false if no such tenant.
    pub async fn update(&self, id: i64, name: &str, address: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE tenants SET name = ?, address = ? WHERE id = ?")
            .bind(name)
            .bind(address)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a tenant. Users that belonged to it are detached, not deleted.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
