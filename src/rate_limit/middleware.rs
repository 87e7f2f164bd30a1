//! HTTP rate limiting.
//!
//! Response headers per level (`App`, `Account`, `Token`):
//!
//! - `X-RateLimit-Limit-{level}`: tightest configured ceiling, minute first
//! - `X-RateLimit-Remaining-{level}`
//! - `X-RateLimit-Reset-{level}`: unix seconds
//!
//! Rejections are `429` with `Retry-After` and `{error, code, timestamp}`.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::manager::{LevelDecision, LimitLevel, RateLimitManager};
use crate::account::AccountLookup;
use crate::api_auth::RequestIdentity;
use crate::error::with_deadline;

/// Body of a 429 response.
#[derive(Debug, Serialize)]
pub struct RateLimitErrorBody {
    pub error: &'static str,
    pub code: u16,
    pub timestamp: String,
}

fn header_names(level: LimitLevel) -> [HeaderName; 3] {
    let [limit, remaining, reset] = match level {
        LimitLevel::App => [
            "x-ratelimit-limit-app",
            "x-ratelimit-remaining-app",
            "x-ratelimit-reset-app",
        ],
        LimitLevel::Account => [
            "x-ratelimit-limit-account",
            "x-ratelimit-remaining-account",
            "x-ratelimit-reset-account",
        ],
        LimitLevel::Token => [
            "x-ratelimit-limit-token",
            "x-ratelimit-remaining-token",
            "x-ratelimit-reset-token",
        ],
    };
    [
        HeaderName::from_static(limit),
        HeaderName::from_static(remaining),
        HeaderName::from_static(reset),
    ]
}

/// Convert a monotonic reset instant to unix seconds.
fn reset_unix_secs(reset_at: Instant) -> i64 {
    let until = reset_at.saturating_duration_since(Instant::now());
    (Utc::now() + chrono::TimeDelta::from_std(until).unwrap_or_default()).timestamp()
}

/// Write the level's headers, skipping unbounded decisions.
pub fn apply_limit_headers(headers: &mut HeaderMap, result: &LevelDecision) {
    let Some(policy) = result.policy.filter(|p| !p.is_unbounded()) else {
        return;
    };
    if result.decision.remaining < 0 {
        return;
    }
    let [limit, remaining, reset] = header_names(result.level);
    headers.insert(limit, HeaderValue::from(policy.header_limit()));
    headers.insert(remaining, HeaderValue::from(result.decision.remaining));
    headers.insert(
        reset,
        HeaderValue::from(reset_unix_secs(result.decision.reset_at)),
    );
}

/// Whole seconds until `reset_at`, rounded up and at least 1.
pub fn retry_after_secs(reset_at: Instant) -> u64 {
    let wait: Duration = reset_at.saturating_duration_since(Instant::now());
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// Build the 429 response for a rejected decision.
pub fn rejection_response(result: &LevelDecision) -> Response {
    let body = RateLimitErrorBody {
        error: result.level.rejection_message(),
        code: StatusCode::TOO_MANY_REQUESTS.as_u16(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    apply_limit_headers(headers, result);
    headers.insert(
        RETRY_AFTER,
        HeaderValue::from(retry_after_secs(result.decision.reset_at)),
    );
    response
}

/// Turn a level check into either a pass (with headers to attach) or a 429.
pub fn enforce(result: Option<LevelDecision>) -> Result<Option<LevelDecision>, Response> {
    match result {
        Some(r) if !r.decision.allowed => Err(rejection_response(&r)),
        other => Ok(other),
    }
}

/// Application-wide limit, wrapping every route.
pub async fn app_rate_limit_middleware(
    State(manager): State<Arc<RateLimitManager>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let checked = match enforce(manager.check_app()) {
        Ok(checked) => checked,
        Err(rejected) => return rejected,
    };

    let mut response = next.run(request).await;
    if let Some(result) = checked {
        apply_limit_headers(response.headers_mut(), &result);
    }
    response
}

/// State for the account-level middleware.
pub struct AccountLimitState {
    pub manager: Arc<RateLimitManager>,
    pub accounts: Arc<dyn AccountLookup>,
    pub lookup_deadline: Duration,
}

/// Per-account limit. Runs after authentication; requests without an
/// identity, or whose account cannot be loaded, pass unchecked.
pub async fn account_rate_limit_middleware(
    State(state): State<Arc<AccountLimitState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.manager.is_enabled(LimitLevel::Account) {
        return next.run(request).await;
    }
    let Some(identity) = request.extensions().get::<RequestIdentity>().cloned() else {
        return next.run(request).await;
    };

    let account = match with_deadline(
        state.lookup_deadline,
        state.accounts.get_by_id(&identity.account_id),
    )
    .await
    {
        Ok(Some(account)) => account,
        Ok(None) => return next.run(request).await,
        Err(e) => {
            tracing::warn!(account_id = %identity.account_id, error = %e, "account limit skipped");
            return next.run(request).await;
        }
    };

    let checked = match enforce(state.manager.check_account(&account.id, account.rate_limit)) {
        Ok(checked) => checked,
        Err(rejected) => return rejected,
    };

    let mut response = next.run(request).await;
    if let Some(result) = checked {
        apply_limit_headers(response.headers_mut(), &result);
    }
    response
}
