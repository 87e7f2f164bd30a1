//! Authoritative token storage.
//!
//! Every mutating call takes the owning tenant id and only touches tokens of
//! that tenant; a token of another tenant behaves as absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::models::Token;
use crate::error::StoreError;

/// Listing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFilter {
    pub active_only: bool,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            active_only: false,
            limit: 50,
            offset: 0,
        }
    }
}

/// Repository trait for tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a new token; id and value must be unique
    async fn create(&self, token: Token) -> Result<Token, StoreError>;

    async fn get_by_value(&self, value: &str) -> Result<Option<Token>, StoreError>;

    async fn get_by_id(&self, token_id: &str) -> Result<Option<Token>, StoreError>;

    /// Tokens of one tenant, newest first
    async fn list_by_account(
        &self,
        account_id: &str,
        filter: ListFilter,
    ) -> Result<Vec<Token>, StoreError>;

    async fn count_by_account(&self, account_id: &str, active_only: bool)
    -> Result<u64, StoreError>;

    /// Set `is_active`; returns the updated token, `None` if not owned
    async fn update_status(
        &self,
        account_id: &str,
        token_id: &str,
        is_active: bool,
    ) -> Result<Option<Token>, StoreError>;

    /// Remove a token; returns it, `None` if not owned
    async fn delete(&self, account_id: &str, token_id: &str) -> Result<Option<Token>, StoreError>;

    /// Bump `total_requests` and set `last_used_at`
    async fn increment_usage(&self, token_id: &str, used_at: DateTime<Utc>)
    -> Result<(), StoreError>;
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, Token>,
    id_by_value: HashMap<String, String>,
}

/// In-process token store. Both indexes change under one lock.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: RwLock<Inner>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create(&self, token: Token) -> Result<Token, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.by_id.contains_key(&token.id) {
            return Err(StoreError::Conflict(format!("token id {}", token.id)));
        }
        if inner.id_by_value.contains_key(&token.value) {
            return Err(StoreError::Conflict("token value".to_string()));
        }
        inner
            .id_by_value
            .insert(token.value.clone(), token.id.clone());
        inner.by_id.insert(token.id.clone(), token.clone());
        Ok(token)
    }

    async fn get_by_value(&self, value: &str) -> Result<Option<Token>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .id_by_value
            .get(value)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn get_by_id(&self, token_id: &str) -> Result<Option<Token>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.by_id.get(token_id).cloned())
    }

    async fn list_by_account(
        &self,
        account_id: &str,
        filter: ListFilter,
    ) -> Result<Vec<Token>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut tokens: Vec<Token> = inner
            .by_id
            .values()
            .filter(|t| t.account_id == account_id && (!filter.active_only || t.is_active))
            .cloned()
            .collect();
        tokens.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(tokens
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    async fn count_by_account(
        &self,
        account_id: &str,
        active_only: bool,
    ) -> Result<u64, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .by_id
            .values()
            .filter(|t| t.account_id == account_id && (!active_only || t.is_active))
            .count() as u64)
    }

    async fn update_status(
        &self,
        account_id: &str,
        token_id: &str,
        is_active: bool,
    ) -> Result<Option<Token>, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match inner.by_id.get_mut(token_id) {
            Some(token) if token.account_id == account_id => {
                token.is_active = is_active;
                Ok(Some(token.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, account_id: &str, token_id: &str) -> Result<Option<Token>, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let owned = inner
            .by_id
            .get(token_id)
            .is_some_and(|t| t.account_id == account_id);
        if !owned {
            return Ok(None);
        }
        let removed = inner.by_id.remove(token_id);
        if let Some(token) = &removed {
            inner.id_by_value.remove(&token.value);
        }
        Ok(removed)
    }

    async fn increment_usage(
        &self,
        token_id: &str,
        used_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = inner.by_id.get_mut(token_id) {
            token.total_requests += 1;
            token.last_used_at = Some(used_at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::models::sample_token;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryTokenStore::new();
        store
            .create(sample_token("tk_1", "acc_a", "sk-1"))
            .await
            .unwrap();

        assert_eq!(store.get_by_id("tk_1").await.unwrap().unwrap().value, "sk-1");
        assert_eq!(store.get_by_value("sk-1").await.unwrap().unwrap().id, "tk_1");
        assert!(store.get_by_value("sk-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = MemoryTokenStore::new();
        store
            .create(sample_token("tk_1", "acc_a", "sk-1"))
            .await
            .unwrap();
        assert!(store.create(sample_token("tk_1", "acc_a", "sk-2")).await.is_err());
        assert!(store.create(sample_token("tk_2", "acc_a", "sk-1")).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_tenant_scoped_and_paged() {
        let store = MemoryTokenStore::new();
        let base = Utc::now();
        for i in 0..5 {
            let mut t = sample_token(&format!("tk_{}", i), "acc_a", &format!("sk-{}", i));
            t.created_at = base + TimeDelta::seconds(i);
            t.is_active = i % 2 == 0;
            store.create(t).await.unwrap();
        }
        store
            .create(sample_token("tk_b", "acc_b", "sk-b"))
            .await
            .unwrap();

        let all = store
            .list_by_account("acc_a", ListFilter::default())
            .await
            .unwrap();
        let ids: Vec<&str> = all.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["tk_4", "tk_3", "tk_2", "tk_1", "tk_0"]);

        let page = store
            .list_by_account(
                "acc_a",
                ListFilter {
                    active_only: true,
                    limit: 1,
                    offset: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "tk_2");

        assert_eq!(store.count_by_account("acc_a", false).await.unwrap(), 5);
        assert_eq!(store.count_by_account("acc_a", true).await.unwrap(), 3);
        assert_eq!(store.count_by_account("acc_c", false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cross_tenant_mutations_are_no_ops() {
        let store = MemoryTokenStore::new();
        store
            .create(sample_token("tk_1", "acc_a", "sk-1"))
            .await
            .unwrap();

        assert!(store.update_status("acc_b", "tk_1", false).await.unwrap().is_none());
        assert!(store.delete("acc_b", "tk_1").await.unwrap().is_none());
        assert!(store.get_by_id("tk_1").await.unwrap().unwrap().is_active);

        let updated = store.update_status("acc_a", "tk_1", false).await.unwrap();
        assert!(!updated.unwrap().is_active);
        assert!(store.delete("acc_a", "tk_1").await.unwrap().is_some());
        assert!(store.get_by_value("sk-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_usage() {
        let store = MemoryTokenStore::new();
        store
            .create(sample_token("tk_1", "acc_a", "sk-1"))
            .await
            .unwrap();
        let at = Utc::now();
        store.increment_usage("tk_1", at).await.unwrap();
        store.increment_usage("tk_1", at).await.unwrap();
        store.increment_usage("missing", at).await.unwrap();

        let token = store.get_by_id("tk_1").await.unwrap().unwrap();
        assert_eq!(token.total_requests, 2);
        assert_eq!(token.last_used_at, Some(at));
    }
}
