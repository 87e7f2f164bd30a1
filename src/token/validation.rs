//! Bearer token validation.
//!
//! Order of checks: lookup, active flag, expiry, scopes, token-level rate
//! limit. Usage is recorded in a detached task only after every check
//! passed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use super::cache::TokenCache;
use super::models::Token;
use crate::api_auth::uid_mapper::uid_from_tenant_id;
use crate::error::{StoreError, with_deadline};
use crate::rate_limit::{LevelDecision, RateLimitManager};
use crate::scope::missing_scopes;

pub const MSG_VALID: &str = "Token is valid";
pub const MSG_NOT_FOUND: &str = "Token not found";
pub const MSG_INACTIVE: &str = "Token is inactive";
pub const MSG_EXPIRED: &str = "Token has expired";
pub const MSG_INSUFFICIENT_SCOPE: &str = "Insufficient scope";

/// `utype` bit marking a disabled user.
pub const USER_TYPE_DISABLED: u32 = 1 << 28;
/// `utype` bit marking an enterprise user.
pub const USER_TYPE_ENTERPRISE: u32 = 1 << 2;

/// Optional body of the validation endpoints.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ValidateRequest {
    #[serde(default)]
    #[schema(example = json!(["storage:read"]))]
    pub required_scopes: Vec<String>,
    /// Single-scope form, merged into `required_scopes`
    #[serde(default)]
    pub required_scope: Option<String>,
}

impl ValidateRequest {
    pub fn required(&self) -> Vec<String> {
        let mut required = self.required_scopes.clone();
        if let Some(scope) = self.required_scope.as_ref().filter(|s| !s.is_empty()) {
            required.push(scope.clone());
        }
        required
    }
}

/// Extended profile of a legacy user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub uid: u32,
    pub email: String,
    pub username: String,
    /// User type bitmask
    pub utype: u32,
    pub activated: bool,
    #[serde(default)]
    pub disabled_type: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uid: Option<u32>,
    /// Unix seconds
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<i64>,
}

impl UserInfo {
    pub fn is_disabled(&self) -> bool {
        self.utype & USER_TYPE_DISABLED != 0
    }

    pub fn is_enterprise(&self) -> bool {
        self.utype & USER_TYPE_ENTERPRISE != 0
    }
}

/// Source of extended user profiles for `/validateu`.
#[async_trait]
pub trait UserInfoLookup: Send + Sync {
    async fn get_user_info(&self, uid: u32) -> Result<UserInfo, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TokenInfo {
    pub token_id: String,
    /// HMAC tenants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Legacy tenants (`qiniu_<uid>`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iuid: Option<String>,
    pub scope: Vec<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}

impl TokenInfo {
    pub fn from_token(token: &Token) -> Self {
        let uid = uid_from_tenant_id(&token.account_id);
        Self {
            token_id: token.id.clone(),
            account_id: uid.is_none().then(|| token.account_id.clone()),
            uid,
            iuid: uid.and(token.iam_uid.clone()),
            scope: token.scope.clone(),
            is_active: token.is_active,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
            user_info: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_info: Option<TokenInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_scopes: Vec<String>,
}

impl ValidateResponse {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            token_info: None,
            missing_scopes: Vec::new(),
        }
    }
}

/// Result of a validation.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// Usable; carries the token-level limit decision for response headers
    Valid {
        response: ValidateResponse,
        limit: Option<LevelDecision>,
    },
    /// Missing, unknown, inactive or expired
    Invalid(ValidateResponse),
    /// Known token lacking required scopes
    Forbidden(ValidateResponse),
    /// Token-level limit rejected the request
    RateLimited(LevelDecision),
}

pub struct ValidationService {
    cache: Arc<TokenCache>,
    limits: Arc<RateLimitManager>,
    user_info: Option<Arc<dyn UserInfoLookup>>,
    lookup_deadline: Duration,
}

impl ValidationService {
    pub fn new(cache: Arc<TokenCache>, limits: Arc<RateLimitManager>) -> Self {
        let lookup_deadline = cache.store_deadline();
        Self {
            cache,
            limits,
            user_info: None,
            lookup_deadline,
        }
    }

    pub fn with_user_info(mut self, lookup: Arc<dyn UserInfoLookup>) -> Self {
        self.user_info = Some(lookup);
        self
    }

    pub async fn validate(
        &self,
        token_value: &str,
        required: &[String],
    ) -> Result<ValidationOutcome, StoreError> {
        self.validate_at(token_value, required, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        token_value: &str,
        required: &[String],
        now: DateTime<Utc>,
    ) -> Result<ValidationOutcome, StoreError> {
        let token = match self.cache.get_by_value(token_value).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::info!(token = %super::models::mask_token(token_value), "{}", MSG_NOT_FOUND);
                return Ok(ValidationOutcome::Invalid(ValidateResponse::invalid(
                    MSG_NOT_FOUND,
                )));
            }
            Err(e) => {
                tracing::error!(error = %e, "token lookup failed");
                return Err(e);
            }
        };

        if !token.is_active {
            tracing::info!(token_id = %token.id, "{}", MSG_INACTIVE);
            return Ok(ValidationOutcome::Invalid(ValidateResponse::invalid(
                MSG_INACTIVE,
            )));
        }
        if token.is_expired_at(now) {
            tracing::info!(token_id = %token.id, expires_at = ?token.expires_at, "{}", MSG_EXPIRED);
            return Ok(ValidationOutcome::Invalid(ValidateResponse::invalid(
                MSG_EXPIRED,
            )));
        }

        let missing = missing_scopes(&token.scope, required);
        if !missing.is_empty() {
            tracing::info!(token_id = %token.id, ?missing, "token lacks required scopes");
            return Ok(ValidationOutcome::Forbidden(ValidateResponse {
                valid: false,
                message: MSG_INSUFFICIENT_SCOPE.to_string(),
                token_info: Some(TokenInfo::from_token(&token)),
                missing_scopes: missing,
            }));
        }

        let limit = self.limits.check_token(&token.id, token.rate_limit);
        if let Some(decision) = limit.filter(|d| !d.decision.allowed) {
            return Ok(ValidationOutcome::RateLimited(decision));
        }

        self.record_usage(&token.id, now);
        tracing::debug!(token_id = %token.id, account_id = %token.account_id, "token validated");

        Ok(ValidationOutcome::Valid {
            response: ValidateResponse {
                valid: true,
                message: MSG_VALID.to_string(),
                token_info: Some(TokenInfo::from_token(&token)),
                missing_scopes: Vec::new(),
            },
            limit,
        })
    }

    /// Validate and attach the legacy user's profile when available.
    ///
    /// Profile lookup failures omit `user_info` instead of failing.
    pub async fn validate_with_user_info(
        &self,
        token_value: &str,
        required: &[String],
    ) -> Result<ValidationOutcome, StoreError> {
        let mut outcome = self.validate(token_value, required).await?;
        if let (ValidationOutcome::Valid { response, .. }, Some(lookup)) =
            (&mut outcome, &self.user_info)
        {
            if let Some(info) = response.token_info.as_mut() {
                if let Some(uid) = info.uid {
                    match with_deadline(self.lookup_deadline, lookup.get_user_info(uid)).await {
                        Ok(user) => info.user_info = Some(user),
                        Err(e) => tracing::warn!(
                            uid,
                            token_id = %info.token_id,
                            error = %e,
                            "user info lookup failed"
                        ),
                    }
                }
            }
        }
        Ok(outcome)
    }

    fn record_usage(&self, token_id: &str, used_at: DateTime<Utc>) {
        let source = Arc::clone(self.cache.source());
        let deadline = self.lookup_deadline;
        let token_id = token_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = with_deadline(deadline, source.increment_usage(&token_id, used_at)).await
            {
                tracing::warn!(token_id = %token_id, error = %e, "usage increment failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{RateLimitPolicy, RateLimitSettings, SlidingWindowLimiter};
    use crate::token::cache::{CacheSettings, MemoryFastStore};
    use crate::token::models::sample_token;
    use crate::token::store::{MemoryTokenStore, TokenStore};
    use chrono::TimeDelta;

    struct FixedUsers;

    #[async_trait]
    impl UserInfoLookup for FixedUsers {
        async fn get_user_info(&self, uid: u32) -> Result<UserInfo, StoreError> {
            if uid != 1369077332 {
                return Err(StoreError::Unavailable("user db down".into()));
            }
            Ok(UserInfo {
                uid,
                email: "user@example.com".into(),
                username: "testuser".into(),
                utype: USER_TYPE_ENTERPRISE,
                activated: true,
                disabled_type: 0,
                disabled_reason: None,
                disabled_at: None,
                parent_uid: None,
                created_at: 1_700_000_000,
                updated_at: 1_700_000_000,
                last_login_at: None,
            })
        }
    }

    async fn setup(tokens: Vec<Token>, settings: RateLimitSettings) -> ValidationService {
        let store = Arc::new(MemoryTokenStore::new());
        for token in tokens {
            store.create(token).await.unwrap();
        }
        let cache = TokenCache::new(
            store,
            Some(Arc::new(MemoryFastStore::new())),
            &CacheSettings::default(),
            Duration::from_secs(1),
        );
        let limits = RateLimitManager::new(Arc::new(SlidingWindowLimiter::new()), settings);
        ValidationService::new(Arc::new(cache), Arc::new(limits)).with_user_info(Arc::new(FixedUsers))
    }

    fn valid_response(outcome: ValidationOutcome) -> ValidateResponse {
        match outcome {
            ValidationOutcome::Valid { response, .. } => response,
            other => panic!("expected valid, got {:?}", other),
        }
    }

    fn invalid_message(outcome: ValidationOutcome) -> String {
        match outcome {
            ValidationOutcome::Invalid(response) => {
                assert!(!response.valid);
                response.message
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_valid_hmac_token() {
        let svc = setup(
            vec![sample_token("tk_1", "acc_a", "sk-1")],
            RateLimitSettings::default(),
        )
        .await;
        let response = valid_response(svc.validate("sk-1", &[]).await.unwrap());
        assert_eq!(response.message, MSG_VALID);
        let info = response.token_info.unwrap();
        assert_eq!(info.account_id.as_deref(), Some("acc_a"));
        assert_eq!(info.uid, None);
    }

    #[tokio::test]
    async fn test_legacy_tenant_reports_uid() {
        let mut token = sample_token("tk_1", "qiniu_1369077332", "sk-1");
        token.iam_uid = Some("iam_9".into());
        let svc = setup(vec![token], RateLimitSettings::default()).await;

        let info = valid_response(svc.validate("sk-1", &[]).await.unwrap())
            .token_info
            .unwrap();
        assert_eq!(info.account_id, None);
        assert_eq!(info.uid, Some(1369077332));
        assert_eq!(info.iuid.as_deref(), Some("iam_9"));
        assert!(info.user_info.is_none());
    }

    #[tokio::test]
    async fn test_rejections() {
        let now = Utc::now();
        let mut inactive = sample_token("tk_2", "acc_a", "sk-2");
        inactive.is_active = false;
        let mut expired = sample_token("tk_3", "acc_a", "sk-3");
        expired.expires_at = Some(now - TimeDelta::seconds(1));
        let svc = setup(vec![inactive, expired], RateLimitSettings::default()).await;

        let msg = invalid_message(svc.validate_at("sk-none", &[], now).await.unwrap());
        assert_eq!(msg, MSG_NOT_FOUND);
        let msg = invalid_message(svc.validate_at("sk-2", &[], now).await.unwrap());
        assert_eq!(msg, MSG_INACTIVE);
        let msg = invalid_message(svc.validate_at("sk-3", &[], now).await.unwrap());
        assert_eq!(msg, MSG_EXPIRED);
    }

    #[tokio::test]
    async fn test_scope_check() {
        let svc = setup(
            vec![sample_token("tk_1", "acc_a", "sk-1")],
            RateLimitSettings::default(),
        )
        .await;

        let ok = svc
            .validate("sk-1", &["storage:read".to_string()])
            .await
            .unwrap();
        assert!(valid_response(ok).valid);

        let denied = svc
            .validate("sk-1", &["storage:write".to_string(), "cdn:read".to_string()])
            .await
            .unwrap();
        match denied {
            ValidationOutcome::Forbidden(response) => {
                assert_eq!(response.message, MSG_INSUFFICIENT_SCOPE);
                assert_eq!(response.missing_scopes, vec!["cdn:read".to_string()]);
            }
            other => panic!("expected forbidden, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_scope_grants_nothing() {
        let mut token = sample_token("tk_1", "acc_a", "sk-1");
        token.scope.clear();
        let svc = setup(vec![token], RateLimitSettings::default()).await;
        match svc.validate("sk-1", &["cdn:purge".to_string()]).await.unwrap() {
            ValidationOutcome::Forbidden(response) => {
                assert!(!response.valid);
                assert_eq!(response.missing_scopes, vec!["cdn:purge".to_string()]);
            }
            other => panic!("expected forbidden, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_token_rate_limit() {
        let mut token = sample_token("tk_1", "acc_a", "sk-1");
        token.rate_limit = Some(RateLimitPolicy::per_minute(2));
        let svc = setup(
            vec![token],
            RateLimitSettings {
                enable_token_limit: true,
                ..RateLimitSettings::default()
            },
        )
        .await;

        for expected_remaining in [1, 0] {
            match svc.validate("sk-1", &[]).await.unwrap() {
                ValidationOutcome::Valid { limit, .. } => {
                    assert_eq!(limit.unwrap().decision.remaining, expected_remaining)
                }
                other => panic!("expected valid, got {:?}", other),
            }
        }
        assert!(matches!(
            svc.validate("sk-1", &[]).await.unwrap(),
            ValidationOutcome::RateLimited(_)
        ));
    }

    #[tokio::test]
    async fn test_usage_recorded_after_success() {
        let svc = setup(
            vec![sample_token("tk_1", "acc_a", "sk-1")],
            RateLimitSettings::default(),
        )
        .await;
        svc.validate("sk-1", &[]).await.unwrap();
        svc.validate("sk-none", &[]).await.unwrap();

        let source = svc.cache.source();
        for _ in 0..100 {
            let token = source.get_by_id("tk_1").await.unwrap().unwrap();
            if token.total_requests == 1 {
                assert!(token.last_used_at.is_some());
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("usage was never recorded");
    }

    #[tokio::test]
    async fn test_validateu_enriches_legacy_tenant() {
        let svc = setup(
            vec![
                sample_token("tk_1", "qiniu_1369077332", "sk-1"),
                sample_token("tk_2", "qiniu_5", "sk-2"),
                sample_token("tk_3", "acc_hmac", "sk-3"),
            ],
            RateLimitSettings::default(),
        )
        .await;

        let info = valid_response(svc.validate_with_user_info("sk-1", &[]).await.unwrap())
            .token_info
            .unwrap();
        let user = info.user_info.unwrap();
        assert_eq!(user.email, "user@example.com");
        assert!(user.is_enterprise());
        assert!(!user.is_disabled());

        // Lookup failure degrades to the basic answer.
        let info = valid_response(svc.validate_with_user_info("sk-2", &[]).await.unwrap())
            .token_info
            .unwrap();
        assert_eq!(info.uid, Some(5));
        assert!(info.user_info.is_none());

        let info = valid_response(svc.validate_with_user_info("sk-3", &[]).await.unwrap())
            .token_info
            .unwrap();
        assert!(info.user_info.is_none());
        assert_eq!(info.account_id.as_deref(), Some("acc_hmac"));
    }

    #[test]
    fn test_request_merges_single_scope() {
        let req: ValidateRequest =
            serde_json::from_str(r#"{"required_scopes":["a:b"],"required_scope":"c:d"}"#).unwrap();
        assert_eq!(req.required(), vec!["a:b".to_string(), "c:d".to_string()]);
        let empty: ValidateRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.required().is_empty());
    }
}
