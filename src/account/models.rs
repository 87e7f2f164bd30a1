//! Data models for tenant accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitPolicy;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

/// Tenant account.
///
/// `secret_key` is kept in plaintext because HMAC verification needs it.
/// It is redacted from `Debug` output.
#[derive(Clone)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub company: String,
    pub access_key: String,
    pub secret_key: String,
    pub status: AccountStatus,
    /// External numeric id, for accounts created through the legacy path
    pub qiniu_uid: Option<u32>,
    pub rate_limit: Option<RateLimitPolicy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Build an active account with the given credential pair.
    pub fn new(
        id: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            email: String::new(),
            company: String::new(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            status: AccountStatus::Active,
            qiniu_uid: None,
            rate_limit: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("status", &self.status)
            .field("qiniu_uid", &self.qiniu_uid)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_active() {
        let account = Account::new("acc_1", "AK_1", "secret");
        assert!(account.is_active());
        assert!(account.rate_limit.is_none());
    }

    #[test]
    fn test_suspended_account() {
        let account = Account::new("acc_1", "AK_1", "secret").with_status(AccountStatus::Suspended);
        assert!(!account.is_active());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let account = Account::new("acc_1", "AK_1", "super-secret-value");
        let debug = format!("{:?}", account);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&AccountStatus::Suspended).unwrap(),
            "\"suspended\""
        );
    }
}
