//! Multi-tier sliding window limiter.
//!
//! Each key owns up to three windows (minute, hour, day) holding the
//! admission instants still inside the window. Tiers are checked in that
//! order; the first full tier rejects the request without recording it.
//! An admitted request is recorded in every configured tier.
//!
//! Locking: the key map sits behind an `RwLock` with double-checked
//! creation, each key's windows behind their own `Mutex`. Pruning happens
//! inline on every call; `cleanup` only reclaims memory of idle keys.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Sentinel `remaining` for keys without any configured ceiling.
pub const UNBOUNDED: i64 = -1;

/// Per-minute/hour/day ceilings. Zero means "not configured".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RateLimitPolicy {
    #[serde(default)]
    #[schema(example = 60)]
    pub requests_per_minute: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub requests_per_hour: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub requests_per_day: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl RateLimitPolicy {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            requests_per_minute: limit,
            ..Self::default()
        }
    }

    /// Configured tiers in check order.
    pub fn tiers(&self) -> impl Iterator<Item = (Tier, u32)> {
        [
            (Tier::Minute, self.requests_per_minute),
            (Tier::Hour, self.requests_per_hour),
            (Tier::Day, self.requests_per_day),
        ]
        .into_iter()
        .filter(|(_, limit)| *limit > 0)
    }

    pub fn is_unbounded(&self) -> bool {
        self.tiers().next().is_none()
    }

    /// Ceiling reported in `X-RateLimit-Limit-*`: the minute limit, else the
    /// hour limit, else the day limit.
    pub fn header_limit(&self) -> u32 {
        self.tiers().next().map(|(_, limit)| limit).unwrap_or(0)
    }
}

/// Window tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Minute,
    Hour,
    Day,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

/// Window lengths per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierDurations {
    pub minute: Duration,
    pub hour: Duration,
    pub day: Duration,
}

impl TierDurations {
    pub fn of(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Minute => self.minute,
            Tier::Hour => self.hour,
            Tier::Day => self.day,
        }
    }
}

impl Default for TierDurations {
    fn default() -> Self {
        Self {
            minute: Duration::from_secs(60),
            hour: Duration::from_secs(60 * 60),
            day: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Outcome of one `allow` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Requests left in the tightest tier, or `UNBOUNDED`
    pub remaining: i64,
    /// When the oldest counted request leaves its window
    pub reset_at: Instant,
    /// Tier that rejected the request
    pub limited_by: Option<Tier>,
}

#[derive(Debug, Default)]
struct Window {
    hits: VecDeque<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant, duration: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= duration {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn reset_at(&self, now: Instant, duration: Duration) -> Instant {
        self.hits.front().map(|&oldest| oldest + duration).unwrap_or(now)
    }
}

#[derive(Debug, Default)]
struct KeyWindows {
    minute: Window,
    hour: Window,
    day: Window,
}

impl KeyWindows {
    fn window(&mut self, tier: Tier) -> &mut Window {
        match tier {
            Tier::Minute => &mut self.minute,
            Tier::Hour => &mut self.hour,
            Tier::Day => &mut self.day,
        }
    }

    fn prune_all(&mut self, now: Instant, durations: &TierDurations) {
        for tier in [Tier::Minute, Tier::Hour, Tier::Day] {
            self.window(tier).prune(now, durations.of(tier));
        }
    }

    fn is_empty(&self) -> bool {
        self.minute.hits.is_empty() && self.hour.hits.is_empty() && self.day.hits.is_empty()
    }
}

/// In-process sliding window limiter, shared by reference.
pub struct SlidingWindowLimiter {
    keys: RwLock<HashMap<String, Arc<Mutex<KeyWindows>>>>,
    durations: TierDurations,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::with_durations(TierDurations::default())
    }

    pub fn with_durations(durations: TierDurations) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            durations,
        }
    }

    /// Check and record a request for `key` now.
    pub fn allow(&self, key: &str, policy: Option<&RateLimitPolicy>) -> Decision {
        self.allow_at(key, policy, Instant::now())
    }

    /// Check and record a request for `key` at `now`.
    pub fn allow_at(&self, key: &str, policy: Option<&RateLimitPolicy>, now: Instant) -> Decision {
        let Some(policy) = policy.filter(|p| !p.is_unbounded()) else {
            return Decision {
                allowed: true,
                remaining: UNBOUNDED,
                reset_at: now,
                limited_by: None,
            };
        };

        let state = self.get_or_create(key);
        let mut windows = state.lock().unwrap_or_else(PoisonError::into_inner);

        for (tier, limit) in policy.tiers() {
            let duration = self.durations.of(tier);
            let window = windows.window(tier);
            window.prune(now, duration);
            if window.hits.len() >= limit as usize {
                return Decision {
                    allowed: false,
                    remaining: 0,
                    reset_at: window.reset_at(now, duration),
                    limited_by: Some(tier),
                };
            }
        }

        let mut remaining = i64::MAX;
        let mut reset_at: Option<Instant> = None;
        for (tier, limit) in policy.tiers() {
            let duration = self.durations.of(tier);
            let window = windows.window(tier);
            window.hits.push_back(now);
            remaining = remaining.min(limit as i64 - window.hits.len() as i64);
            let tier_reset = window.reset_at(now, duration);
            reset_at = Some(reset_at.map_or(tier_reset, |r| r.min(tier_reset)));
        }

        Decision {
            allowed: true,
            remaining,
            reset_at: reset_at.unwrap_or(now),
            limited_by: None,
        }
    }

    fn get_or_create(&self, key: &str) -> Arc<Mutex<KeyWindows>> {
        {
            let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(state) = keys.get(key) {
                return Arc::clone(state);
            }
        }

        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(keys.entry(key.to_string()).or_default())
    }

    /// Remove keys whose windows are all empty. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        let before = keys.len();
        keys.retain(|_, state| {
            let mut windows = state.lock().unwrap_or_else(PoisonError::into_inner);
            windows.prune_all(now, &self.durations);
            !windows.is_empty()
        });
        before - keys.len()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `cleanup` every `interval` until the runtime shuts down.
    pub fn spawn_cleanup(limiter: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.cleanup();
                if removed > 0 {
                    tracing::debug!(removed, remaining = limiter.len(), "rate limit sweep");
                }
            }
        })
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}
