//! Owner-authenticated token management.
//!
//! Every operation is scoped to the caller's tenant. Mutations write the
//! authoritative store first and then invalidate both cache keys before
//! reporting success.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;
use validator::Validate;

use super::cache::TokenCache;
use super::models::{Token, TokenStatus};
use super::store::ListFilter;
use crate::api_auth::RequestIdentity;
use crate::error::{StoreError, with_deadline};
use crate::keygen;
use crate::rate_limit::RateLimitPolicy;
use crate::scope::{ScopeError, validate_scope_syntax};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_PREFIX_LEN: usize = 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token not found")]
    NotFound,

    #[error(transparent)]
    InvalidScope(#[from] ScopeError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::NotFound => "TOKEN_NOT_FOUND",
            TokenError::InvalidScope(_) => "INVALID_SCOPE",
            TokenError::InvalidRequest(_) => "INVALID_REQUEST",
            TokenError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            TokenError::NotFound => 404,
            TokenError::InvalidScope(_) | TokenError::InvalidRequest(_) => 400,
            TokenError::Store(StoreError::Timeout(_)) => 503,
            TokenError::Store(_) => 500,
        }
    }
}

/// Body of `POST /api/v2/tokens`.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateTokenRequest {
    #[validate(length(min = 1, max = 256))]
    #[schema(example = "ci pipeline")]
    pub description: String,
    /// At least one `resource:action` or `*`
    #[schema(example = json!(["storage:read", "cdn:*"]))]
    pub scope: Vec<String>,
    /// Omitted or 0 never expires
    #[validate(range(min = 0))]
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
    /// Custom value prefix, `[a-z0-9_]{1,12}`; defaults to `sk`
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Returned once, at creation. The only response carrying the full value.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedToken {
    pub token_id: String,
    pub token: String,
    pub account_id: String,
    pub description: String,
    pub scope: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Token summary with a masked value.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenBrief {
    pub token_id: String,
    #[schema(example = "sk-01234567****89abcdef")]
    pub token_preview: String,
    pub description: String,
    pub scope: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub status: TokenStatus,
    pub total_requests: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl TokenBrief {
    pub fn from_token(token: &Token, now: DateTime<Utc>) -> Self {
        Self {
            token_id: token.id.clone(),
            token_preview: token.preview(),
            description: token.description.clone(),
            scope: token.scope.clone(),
            rate_limit: token.rate_limit,
            created_at: token.created_at,
            expires_at: token.expires_at,
            is_active: token.is_active,
            status: token.status_at(now),
            total_requests: token.total_requests,
            last_used_at: token.last_used_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenList {
    pub account_id: String,
    pub tokens: Vec<TokenBrief>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenStats {
    pub token_id: String,
    pub total_requests: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Clamp a requested page to `1..=MAX_PAGE_SIZE`, default `DEFAULT_PAGE_SIZE`.
pub fn page_filter(active_only: bool, limit: Option<usize>, offset: Option<usize>) -> ListFilter {
    let limit = match limit {
        None | Some(0) => DEFAULT_PAGE_SIZE,
        Some(n) => n.min(MAX_PAGE_SIZE),
    };
    ListFilter {
        active_only,
        limit,
        offset: offset.unwrap_or(0),
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    (1..=MAX_PREFIX_LEN).contains(&prefix.len())
        && prefix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

pub struct TokenService {
    cache: Arc<TokenCache>,
}

impl TokenService {
    pub fn new(cache: Arc<TokenCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    pub async fn create(
        &self,
        owner: &RequestIdentity,
        request: CreateTokenRequest,
    ) -> Result<CreatedToken, TokenError> {
        self.create_at(owner, request, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        owner: &RequestIdentity,
        request: CreateTokenRequest,
        now: DateTime<Utc>,
    ) -> Result<CreatedToken, TokenError> {
        request
            .validate()
            .map_err(|e| TokenError::InvalidRequest(e.to_string()))?;
        if let Some(prefix) = &request.prefix {
            if !is_valid_prefix(prefix) {
                return Err(TokenError::InvalidRequest(format!(
                    "prefix must match [a-z0-9_]{{1,{}}}",
                    MAX_PREFIX_LEN
                )));
            }
        }
        validate_scope_syntax(&request.scope)?;
        let expires_at = match request.expires_in_seconds {
            Some(secs) if secs > 0 => Some(
                TimeDelta::try_seconds(secs)
                    .and_then(|ttl| now.checked_add_signed(ttl))
                    .ok_or_else(|| {
                        TokenError::InvalidRequest("expires_in_seconds out of range".into())
                    })?,
            ),
            _ => None,
        };

        let token = Token {
            id: keygen::token_id(),
            account_id: owner.account_id.clone(),
            value: keygen::token_value(request.prefix.as_deref()),
            description: request.description,
            scope: request.scope,
            rate_limit: request.rate_limit,
            created_at: now,
            expires_at,
            is_active: true,
            total_requests: 0,
            last_used_at: None,
            iam_uid: owner.sub_identity.clone(),
        };

        let token = with_deadline(
            self.cache.store_deadline(),
            self.cache.source().create(token),
        )
        .await?;
        tracing::info!(
            token_id = %token.id,
            account_id = %token.account_id,
            method = owner.method.as_str(),
            "token created"
        );

        Ok(CreatedToken {
            token_id: token.id,
            token: token.value,
            account_id: token.account_id,
            description: token.description,
            scope: token.scope,
            rate_limit: token.rate_limit,
            created_at: token.created_at,
            expires_at: token.expires_at,
            is_active: token.is_active,
        })
    }

    pub async fn list(&self, account_id: &str, filter: ListFilter) -> Result<TokenList, TokenError> {
        let deadline = self.cache.store_deadline();
        let source = self.cache.source();
        let tokens = with_deadline(deadline, source.list_by_account(account_id, filter)).await?;
        let total =
            with_deadline(deadline, source.count_by_account(account_id, filter.active_only))
                .await?;

        let now = Utc::now();
        Ok(TokenList {
            account_id: account_id.to_string(),
            tokens: tokens
                .iter()
                .map(|t| TokenBrief::from_token(t, now))
                .collect(),
            total,
        })
    }

    /// Read one token of the tenant. Other tenants' tokens are `NotFound`.
    async fn owned(&self, account_id: &str, token_id: &str) -> Result<Token, TokenError> {
        match self.cache.get_by_id(token_id).await? {
            Some(token) if token.account_id == account_id => Ok(token),
            Some(token) => {
                tracing::warn!(
                    token_id,
                    owner = %token.account_id,
                    caller = account_id,
                    "cross-tenant token access"
                );
                Err(TokenError::NotFound)
            }
            None => Err(TokenError::NotFound),
        }
    }

    pub async fn get(&self, account_id: &str, token_id: &str) -> Result<TokenBrief, TokenError> {
        let token = self.owned(account_id, token_id).await?;
        Ok(TokenBrief::from_token(&token, Utc::now()))
    }

    pub async fn stats(&self, account_id: &str, token_id: &str) -> Result<TokenStats, TokenError> {
        // Usage counters change on every validation; skip the cache.
        let token = with_deadline(
            self.cache.store_deadline(),
            self.cache.source().get_by_id(token_id),
        )
        .await?
        .filter(|t| t.account_id == account_id)
        .ok_or(TokenError::NotFound)?;

        Ok(TokenStats {
            token_id: token.id,
            total_requests: token.total_requests,
            last_used_at: token.last_used_at,
            created_at: token.created_at,
        })
    }

    pub async fn update_status(
        &self,
        account_id: &str,
        token_id: &str,
        is_active: bool,
    ) -> Result<TokenBrief, TokenError> {
        let updated = with_deadline(
            self.cache.store_deadline(),
            self.cache
                .source()
                .update_status(account_id, token_id, is_active),
        )
        .await?
        .ok_or(TokenError::NotFound)?;

        self.cache.invalidate(&updated.value, &updated.id).await;
        tracing::info!(token_id, account_id, is_active, "token status updated");
        Ok(TokenBrief::from_token(&updated, Utc::now()))
    }

    pub async fn delete(&self, account_id: &str, token_id: &str) -> Result<(), TokenError> {
        let removed = with_deadline(
            self.cache.store_deadline(),
            self.cache.source().delete(account_id, token_id),
        )
        .await?
        .ok_or(TokenError::NotFound)?;

        self.cache.invalidate(&removed.value, &removed.id).await;
        tracing::info!(token_id, account_id, "token deleted");
        Ok(())
    }
}
