use std::sync::Arc;
use std::time::Instant;

use crate::account::{AccountLookup, LegacyAccountDirectory};
use crate::api_auth::{
    AuthDispatcher, DirectUidMapper, DirectoryUidMapper, DispatcherError, ExternalIdMapper,
    ReplayGuard, SignatureReplayCache,
};
use crate::config::{AppConfig, UidMapping};
use crate::rate_limit::{AccountLimitState, RateLimitManager, SlidingWindowLimiter};
use crate::token::{FastStore, TokenCache, TokenService, TokenStore, UserInfoLookup, ValidationService};

/// External collaborators the gateway is wired to.
pub struct Backends {
    pub accounts: Arc<dyn AccountLookup>,
    pub directory: Arc<dyn LegacyAccountDirectory>,
    pub tokens: Arc<dyn TokenStore>,
    /// `None` runs every lookup against `tokens`
    pub fast_store: Option<Arc<dyn FastStore>>,
    pub user_info: Option<Arc<dyn UserInfoLookup>>,
}

/// Shared gateway state, owned by the server instance.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<AuthDispatcher>,
    pub limits: Arc<RateLimitManager>,
    pub account_limits: Arc<AccountLimitState>,
    pub tokens: Arc<TokenService>,
    pub validation: Arc<ValidationService>,
    /// Present when replayed signatures are rejected
    pub replay_cache: Option<Arc<SignatureReplayCache>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &AppConfig, backends: Backends) -> Result<Self, DispatcherError> {
        let deadline = config.auth.store_deadline();

        let mapper: Arc<dyn ExternalIdMapper> = match config.auth.uid_mapping {
            UidMapping::Direct => Arc::new(DirectUidMapper),
            UidMapping::Lookup => Arc::new(DirectoryUidMapper::new(
                backends.directory,
                config.auth.auto_create_accounts,
            )),
        };

        let mut dispatcher = AuthDispatcher::new(
            backends.accounts.clone(),
            mapper,
            ReplayGuard::new(config.auth.tolerance()),
            config.auth.legacy_scheme.clone(),
        )?
        .with_store_deadline(deadline)
        .with_max_body_bytes(config.gateway.max_body_bytes);

        let replay_cache = config
            .auth
            .reject_replayed_signatures
            .then(|| Arc::new(SignatureReplayCache::new()));
        if let Some(cache) = &replay_cache {
            dispatcher = dispatcher.with_replay_cache(cache.clone());
        }

        let limits = Arc::new(RateLimitManager::new(
            Arc::new(SlidingWindowLimiter::new()),
            config.rate_limit.clone(),
        ));

        let cache = Arc::new(TokenCache::new(
            backends.tokens,
            backends.fast_store,
            &config.cache,
            deadline,
        ));

        let mut validation = ValidationService::new(cache.clone(), limits.clone());
        if let Some(lookup) = backends.user_info {
            validation = validation.with_user_info(lookup);
        }

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            account_limits: Arc::new(AccountLimitState {
                manager: limits.clone(),
                accounts: backends.accounts,
                lookup_deadline: deadline,
            }),
            limits,
            tokens: Arc::new(TokenService::new(cache)),
            validation: Arc::new(validation),
            replay_cache,
            started_at: Instant::now(),
        })
    }
}
