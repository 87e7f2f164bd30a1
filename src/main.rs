//! Bearer Token Service
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌────────────┐    ┌──────────┐
//! │  Client  │───▶│ App/Acct │───▶│ Auth       │───▶│  Token   │
//! │          │    │ limits   │    │ HMAC/Stub  │    │  CRUD    │
//! └──────────┘    └──────────┘    └────────────┘    └──────────┘
//!       │                                                 │
//!       │ Bearer  ┌────────────┐    ┌─────────────┐       ▼
//!       └────────▶│ Validation │───▶│ Token cache │──▶ TokenStore
//!                 └────────────┘    └─────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bearer_token_service::account::{Account, MemoryAccountStore};
use bearer_token_service::config::{AppConfig, SeedAccount};
use bearer_token_service::gateway::{self, state::{AppState, Backends}};
use bearer_token_service::token::{MemoryFastStore, MemoryTokenStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn seed_account(seed: &SeedAccount) -> Account {
    let mut account = Account::new(&seed.id, &seed.access_key, &seed.secret_key);
    account.email = seed.email.clone();
    account.qiniu_uid = seed.qiniu_uid;
    account.rate_limit = seed.rate_limit;
    account
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config =
        AppConfig::load(&env).with_context(|| format!("loading config for env {:?}", env))?;
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }
    let _log_guard = bearer_token_service::logging::init_logging(&config);

    tracing::info!("Starting bearer token service in {} mode", env);

    let accounts = Arc::new(MemoryAccountStore::new());
    for seed in &config.accounts {
        accounts
            .insert(seed_account(seed))
            .with_context(|| format!("seeding account {}", seed.id))?;
    }
    tracing::info!(accounts = accounts.len(), "account store ready");

    let fast_store = Arc::new(MemoryFastStore::new());
    let backends = Backends {
        accounts: accounts.clone(),
        directory: accounts,
        tokens: Arc::new(MemoryTokenStore::new()),
        fast_store: Some(fast_store.clone()),
        user_info: None,
    };
    let state = Arc::new(AppState::new(&config, backends).context("building gateway state")?);

    let interval = Duration::from_secs(config.rate_limit.sweep_interval_secs);
    let mut sweepers = gateway::spawn_sweepers(&state, interval);
    sweepers.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = fast_store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "fast store purge");
            }
        }
    }));

    let result = gateway::run_server(&config.gateway, state).await;
    for handle in sweepers {
        handle.abort();
    }
    result
}
