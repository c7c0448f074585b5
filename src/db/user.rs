use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::StoreError;

/// User role for authorization. Closed set; unknown strings never map to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Customer => "customer",
        }
    }

    /// Whether users with this role must belong to a tenant.
    pub fn requires_tenant(&self) -> bool {
        match self {
            Role::Admin => false,
            Role::Manager | Role::Customer => true,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "customer" => Ok(Role::Customer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A user as seen by the rest of the service. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: Option<i64>,
    pub created_at: String,
}

/// The fields needed to check a login attempt.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: i64,
    pub role: Role,
    pub password_hash: String,
}

/// Data for a user about to be created. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub tenant_id: Option<i64>,
}

/// Admin edits to an existing user.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: Option<i64>,
}

/// Lookups the credential flows need from user management.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email_with_hash(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError>;

    /// Create a user. Fails with `StoreError::DuplicateEmail` if the email is taken.
    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError>;
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    role: String,
    tenant_id: Option<i64>,
    created_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            role: row
                .role
                .parse()
                .map_err(|e: UnknownRole| StoreError::Corrupt(e.to_string()))?,
            tenant_id: row.tenant_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, first_name, last_name, email, role, tenant_id, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    pub async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, first_name, last_name, email, role, tenant_id, created_at FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Update a user's profile, role and tenant. Returns false if no such user.
    pub async fn update(&self, id: i64, update: &UserUpdate) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET first_name = ?, last_name = ?, email = ?, role = ?, tenant_id = ? WHERE id = ?",
        )
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.email)
        .bind(update.role.as_str())
        .bind(update.tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user. Their refresh token records go with them.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserDirectory for UserStore {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.get_by_id(id).await
    }

    async fn find_user_by_email_with_hash(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let row: Option<(i64, String, String)> =
            sqlx::query_as("SELECT id, role, password_hash FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id, role, password_hash)| {
            let role = role
                .parse()
                .map_err(|e: UnknownRole| StoreError::Corrupt(e.to_string()))?;
            Ok(UserCredentials {
                id,
                role,
                password_hash,
            })
        })
        .transpose()
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        if self.email_exists(&user.email).await? {
            return Err(StoreError::DuplicateEmail);
        }

        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (first_name, last_name, email, password_hash, role, tenant_id)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id, first_name, last_name, email, role, tenant_id, created_at",
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        User::try_from(row)
    }
}

/// The up-front email check can race with a concurrent insert; the unique
/// index is the final word.
fn map_unique_violation(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        _ => StoreError::Database(e),
    }
}
