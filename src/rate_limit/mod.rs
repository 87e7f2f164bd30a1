//! Rate limiting.
//!
//! - `limiter`: per-key minute/hour/day sliding windows
//! - `manager`: application / account / token levels over one limiter
//! - `middleware`: Axum middleware and `X-RateLimit-*` headers

pub mod limiter;
pub mod manager;
pub mod middleware;

pub use limiter::{Decision, RateLimitPolicy, SlidingWindowLimiter, Tier, TierDurations, UNBOUNDED};
pub use manager::{LevelDecision, LimitLevel, RateLimitManager, RateLimitSettings};
pub use middleware::{
    AccountLimitState, account_rate_limit_middleware, app_rate_limit_middleware,
    apply_limit_headers, enforce, rejection_response,
};
