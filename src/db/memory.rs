//! In-memory stand-ins for the persistent stores.
//!
//! Used by tests that exercise the credential flows without SQLite, including
//! the case where the store cannot be reached.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{
    NewUser, RefreshTokenRecord, RefreshTokenStore, StoreError, User, UserCredentials,
    UserDirectory,
};
use crate::jwt::unix_now;

struct Records {
    next_id: i64,
    by_id: BTreeMap<i64, RefreshTokenRecord>,
}

/// Refresh token store kept in a map. Can be switched to fail every call.
pub struct MemoryRefreshTokenStore {
    ttl_secs: u64,
    records: Mutex<Records>,
    unavailable: AtomicBool,
}

impl MemoryRefreshTokenStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            records: Mutex::new(Records {
                next_id: 1,
                by_id: BTreeMap::new(),
            }),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<std::sync::MutexGuard<'_, Records>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        self.records.lock().map_err(|_| StoreError::Unavailable)
    }

    fn insert(records: &mut Records, user_id: i64, expires_at: u64) -> RefreshTokenRecord {
        let record = RefreshTokenRecord {
            id: records.next_id,
            user_id,
            expires_at,
        };
        records.next_id += 1;
        records.by_id.insert(record.id, record.clone());
        record
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn persist(&self, user_id: i64) -> Result<RefreshTokenRecord, StoreError> {
        let mut records = self.check()?;
        Ok(Self::insert(&mut records, user_id, unix_now().saturating_add(self.ttl_secs)))
    }

    async fn find_active(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let records = self.check()?;
        let now = unix_now();
        Ok(records
            .by_id
            .get(&id)
            .filter(|r| r.user_id == user_id && r.expires_at > now)
            .cloned())
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut records = self.check()?;
        Ok(records.by_id.remove(&id).is_some())
    }

    async fn delete_owned(&self, id: i64, user_id: i64) -> Result<bool, StoreError> {
        let mut records = self.check()?;
        let owned = records
            .by_id
            .get(&id)
            .is_some_and(|r| r.user_id == user_id);
        if owned {
            records.by_id.remove(&id);
        }
        Ok(owned)
    }

    async fn delete_for_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let mut records = self.check()?;
        let before = records.by_id.len();
        records.by_id.retain(|_, r| r.user_id != user_id);
        Ok((before - records.by_id.len()) as u64)
    }

    async fn count_for_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let records = self.check()?;
        Ok(records
            .by_id
            .values()
            .filter(|r| r.user_id == user_id)
            .count() as u64)
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let mut records = self.check()?;
        let now = unix_now();
        let before = records.by_id.len();
        records.by_id.retain(|_, r| r.expires_at > now);
        Ok((before - records.by_id.len()) as u64)
    }
}

struct StoredUser {
    user: User,
    password_hash: String,
}

/// User directory kept in a vector.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<Vec<StoredUser>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.lock().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a user, as an administrator would.
    pub fn remove(&self, id: i64) -> bool {
        match self.users.lock() {
            Ok(mut users) => {
                let before = users.len();
                users.retain(|u| u.user.id != id);
                users.len() != before
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(users.iter().find(|u| u.user.id == id).map(|u| u.user.clone()))
    }

    async fn find_user_by_email_with_hash(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let users = self.users.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(users
            .iter()
            .find(|u| u.user.email.eq_ignore_ascii_case(email))
            .map(|u| UserCredentials {
                id: u.user.id,
                role: u.user.role,
                password_hash: u.password_hash.clone(),
            }))
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().map_err(|_| StoreError::Unavailable)?;
        if users
            .iter()
            .any(|u| u.user.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }

        let id = users.iter().map(|u| u.user.id).max().unwrap_or(0) + 1;
        let created = User {
            id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role,
            tenant_id: user.tenant_id,
            created_at: String::new(),
        };
        users.push(StoredUser {
            user: created.clone(),
            password_hash: user.password_hash.clone(),
        });
        Ok(created)
    }
}
