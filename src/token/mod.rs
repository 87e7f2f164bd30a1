//! Bearer tokens.
//!
//! ## Components
//! - `models`: `Token` and derived status
//! - `store`: authoritative `TokenStore` and its in-memory implementation
//! - `cache`: cache-aside `TokenCache` over a `FastStore`
//! - `service`: owner-facing CRUD with tenant isolation
//! - `validation`: `ValidationService` behind `/api/v2/validate`

pub mod cache;
pub mod models;
pub mod service;
pub mod store;
pub mod validation;

pub use cache::{CacheSettings, CacheStoreError, FastStore, MemoryFastStore, TokenCache};
pub use models::{Token, TokenStatus, mask_token};
pub use service::{
    CreateTokenRequest, CreatedToken, TokenBrief, TokenError, TokenList, TokenService, TokenStats,
    page_filter,
};
pub use store::{ListFilter, MemoryTokenStore, TokenStore};
pub use validation::{
    TokenInfo, UserInfo, UserInfoLookup, ValidateRequest, ValidateResponse, ValidationOutcome,
    ValidationService,
};
