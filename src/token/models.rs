//! Bearer token model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::rate_limit::RateLimitPolicy;

/// Derived token status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Normal,
    Expired,
    Disabled,
}

/// A bearer token owned by one tenant.
///
/// `account_id` never changes after creation. Serialised form is what the
/// fast store caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub account_id: String,
    /// Secret value presented as `Authorization: Bearer {value}`
    pub value: String,
    pub description: String,
    /// Empty means no scope restriction
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
    pub created_at: DateTime<Utc>,
    /// `None` never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(default)]
    pub total_requests: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Sub-account that created the token (legacy callers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_uid: Option<String>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }

    /// Disabled wins over expired.
    pub fn status_at(&self, now: DateTime<Utc>) -> TokenStatus {
        if !self.is_active {
            TokenStatus::Disabled
        } else if self.is_expired_at(now) {
            TokenStatus::Expired
        } else {
            TokenStatus::Normal
        }
    }

    /// Masked value safe for listings and logs.
    pub fn preview(&self) -> String {
        mask_token(&self.value)
    }
}

/// Mask a token value as `{prefix-}{first 8}****{last 8}`.
///
/// Values too short to mask keep only their prefix.
pub fn mask_token(value: &str) -> String {
    const SHOW_BEFORE: usize = 8;
    const SHOW_AFTER: usize = 8;

    let prefix_end = value.find('-').map(|i| i + 1).unwrap_or(0);
    let (prefix, secret) = value.split_at(prefix_end);
    if secret.len() < SHOW_BEFORE + SHOW_AFTER || !secret.is_ascii() {
        return format!("{}****", prefix);
    }
    format!(
        "{}{}****{}",
        prefix,
        &secret[..SHOW_BEFORE],
        &secret[secret.len() - SHOW_AFTER..]
    )
}

#[cfg(test)]
pub(crate) fn sample_token(id: &str, account_id: &str, value: &str) -> Token {
    Token {
        id: id.to_string(),
        account_id: account_id.to_string(),
        value: value.to_string(),
        description: "test token".to_string(),
        scope: vec!["storage:*".to_string()],
        rate_limit: None,
        created_at: Utc::now(),
        expires_at: None,
        is_active: true,
        total_requests: 0,
        last_used_at: None,
        iam_uid: None,
    }
}
