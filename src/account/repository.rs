//! Account repository traits and the in-memory implementation.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::models::{Account, AccountStatus};
use crate::error::StoreError;
use crate::keygen;

/// Account lookups used by the authentication path.
#[async_trait]
pub trait AccountLookup: Send + Sync {
    /// Get an account by its public access key
    async fn get_by_access_key(&self, access_key: &str) -> Result<Option<Account>, StoreError>;

    /// Get an account by tenant id
    async fn get_by_id(&self, account_id: &str) -> Result<Option<Account>, StoreError>;
}

/// Directory mapping external numeric ids to tenant ids.
#[async_trait]
pub trait LegacyAccountDirectory: Send + Sync {
    /// Find the tenant id bound to `uid`
    async fn find_by_uid(&self, uid: u32) -> Result<Option<String>, StoreError>;

    /// Create a tenant for `uid` and return its id
    async fn create_for_uid(&self, uid: u32, email: Option<&str>) -> Result<String, StoreError>;
}

/// DashMap-backed account store.
pub struct MemoryAccountStore {
    by_id: DashMap<String, Account>,
    id_by_access_key: DashMap<String, String>,
    id_by_uid: DashMap<u32, String>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            id_by_access_key: DashMap::new(),
            id_by_uid: DashMap::new(),
        }
    }

    /// Insert an account, failing if its id or access key is taken.
    pub fn insert(&self, account: Account) -> Result<(), StoreError> {
        if self.by_id.contains_key(&account.id) {
            return Err(StoreError::Conflict(account.id));
        }
        if self.id_by_access_key.contains_key(&account.access_key) {
            return Err(StoreError::Conflict(account.access_key));
        }
        self.id_by_access_key
            .insert(account.access_key.clone(), account.id.clone());
        if let Some(uid) = account.qiniu_uid {
            self.id_by_uid.insert(uid, account.id.clone());
        }
        self.by_id.insert(account.id.clone(), account);
        Ok(())
    }

    /// Suspend or reactivate an account. Returns `false` if it does not exist.
    pub fn set_status(&self, account_id: &str, status: AccountStatus) -> bool {
        match self.by_id.get_mut(account_id) {
            Some(mut account) => {
                account.status = status;
                account.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountLookup for MemoryAccountStore {
    async fn get_by_access_key(&self, access_key: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self.id_by_access_key.get(access_key).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.by_id.get(&id).map(|a| a.clone()))
    }

    async fn get_by_id(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.by_id.get(account_id).map(|a| a.clone()))
    }
}

#[async_trait]
impl LegacyAccountDirectory for MemoryAccountStore {
    async fn find_by_uid(&self, uid: u32) -> Result<Option<String>, StoreError> {
        Ok(self.id_by_uid.get(&uid).map(|id| id.clone()))
    }

    async fn create_for_uid(&self, uid: u32, email: Option<&str>) -> Result<String, StoreError> {
        // Concurrent creators for the same uid converge on one tenant.
        let id = self
            .id_by_uid
            .entry(uid)
            .or_insert_with(|| format!("qiniu_{}", uid))
            .clone();
        if !self.by_id.contains_key(&id) {
            let mut account = Account::new(id.clone(), keygen::access_key(), keygen::secret_key());
            account.qiniu_uid = Some(uid);
            account.email = email.unwrap_or_default().to_string();
            self.id_by_access_key
                .insert(account.access_key.clone(), id.clone());
            self.by_id.entry(id.clone()).or_insert(account);
        }
        Ok(id)
    }
}
