//! Three-level rate limiting: application, account, token.
//!
//! All levels share one `SlidingWindowLimiter`; keys are namespaced as
//! `app`, `account:{id}` and `token:{id}`. Each level can be switched off.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::limiter::{Decision, RateLimitPolicy, SlidingWindowLimiter};

/// Limit level, used for header suffixes and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitLevel {
    App,
    Account,
    Token,
}

impl LimitLevel {
    /// Header suffix, e.g. `X-RateLimit-Limit-App`.
    pub fn header_suffix(self) -> &'static str {
        match self {
            Self::App => "App",
            Self::Account => "Account",
            Self::Token => "Token",
        }
    }

    pub fn rejection_message(self) -> &'static str {
        match self {
            Self::App => "Application rate limit exceeded",
            Self::Account => "Account rate limit exceeded",
            Self::Token => "Token rate limit exceeded",
        }
    }
}

/// Which levels are enforced, and the application-wide policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enable_app_limit: bool,
    pub enable_account_limit: bool,
    pub enable_token_limit: bool,
    pub app: RateLimitPolicy,
    /// Idle key sweep interval
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enable_app_limit: false,
            enable_account_limit: false,
            enable_token_limit: false,
            app: RateLimitPolicy {
                requests_per_minute: 1_000,
                requests_per_hour: 50_000,
                requests_per_day: 1_000_000,
            },
            sweep_interval_secs: 300,
        }
    }
}

/// Result of a level check, with the policy it was checked against.
#[derive(Debug, Clone, Copy)]
pub struct LevelDecision {
    pub level: LimitLevel,
    pub policy: Option<RateLimitPolicy>,
    pub decision: Decision,
}

pub struct RateLimitManager {
    limiter: Arc<SlidingWindowLimiter>,
    settings: RateLimitSettings,
}

impl RateLimitManager {
    pub fn new(limiter: Arc<SlidingWindowLimiter>, settings: RateLimitSettings) -> Self {
        Self { limiter, settings }
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    pub fn is_enabled(&self, level: LimitLevel) -> bool {
        match level {
            LimitLevel::App => self.settings.enable_app_limit,
            LimitLevel::Account => self.settings.enable_account_limit,
            LimitLevel::Token => self.settings.enable_token_limit,
        }
    }

    /// Check the application-wide limit. `None` when the level is off.
    pub fn check_app(&self) -> Option<LevelDecision> {
        self.check(LimitLevel::App, "app", Some(self.settings.app))
    }

    /// Check an account's own limit. `None` when the level is off.
    pub fn check_account(
        &self,
        account_id: &str,
        policy: Option<RateLimitPolicy>,
    ) -> Option<LevelDecision> {
        self.check(LimitLevel::Account, &format!("account:{}", account_id), policy)
    }

    /// Check a token's own limit. `None` when the level is off.
    pub fn check_token(
        &self,
        token_id: &str,
        policy: Option<RateLimitPolicy>,
    ) -> Option<LevelDecision> {
        self.check(LimitLevel::Token, &format!("token:{}", token_id), policy)
    }

    fn check(
        &self,
        level: LimitLevel,
        key: &str,
        policy: Option<RateLimitPolicy>,
    ) -> Option<LevelDecision> {
        if !self.is_enabled(level) {
            return None;
        }
        let decision = self.limiter.allow(key, policy.as_ref());
        if !decision.allowed {
            tracing::warn!(
                key,
                tier = decision.limited_by.map(|t| t.as_str()),
                "{}",
                level.rejection_message()
            );
        }
        Some(LevelDecision {
            level,
            policy,
            decision,
        })
    }
}
