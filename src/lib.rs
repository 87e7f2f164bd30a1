//! Bearer Token Service
//!
//! Issues and validates bearer tokens for a multi-tenant API platform.
//!
//! # Modules
//!
//! - [`api_auth`] - HMAC signature and legacy-stub authentication of token owners
//! - [`scope`] - Scope syntax and wildcard authorization
//! - [`rate_limit`] - Sliding-window limits at application, account and token level
//! - [`token`] - Token storage, read-through cache, management and validation
//! - [`account`] - Tenant accounts and their lookup interfaces
//! - [`gateway`] - HTTP router, handlers and OpenAPI document
//! - [`config`] / [`logging`] - Configuration and structured logging

pub mod account;
pub mod api_auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod keygen;
pub mod logging;
pub mod rate_limit;
pub mod scope;
pub mod token;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use error::StoreError;
pub use gateway::{build_router, run_server, state::AppState};
