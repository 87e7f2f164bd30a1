//! HTTP handlers
//!
//! - `health`: liveness
//! - `tokens`: owner-authenticated token management
//! - `validate`: bearer token validation

pub mod health;
pub mod tokens;
pub mod validate;

pub use health::*;
pub use tokens::*;
pub use validate::*;
