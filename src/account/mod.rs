//! Tenant accounts.
//!
//! Accounts own the HMAC credential pair and the optional per-account rate
//! limit. Persistence is behind the `AccountLookup` and
//! `LegacyAccountDirectory` traits; `MemoryAccountStore` implements both.

pub mod models;
pub mod repository;

pub use models::{Account, AccountStatus};
pub use repository::{AccountLookup, LegacyAccountDirectory, MemoryAccountStore};
