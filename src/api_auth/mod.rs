//! Authentication for owner-facing API routes.
//!
//! ## Components
//! - `signature`: HMAC-SHA256 string-to-sign, header parsing, constant-time verify
//! - `replay`: timestamp window guard and optional signature replay cache
//! - `legacy`: legacy stub header grammar
//! - `uid_mapper`: external uid to tenant id strategies
//! - `middleware`: `AuthDispatcher` and the Axum middleware
//! - `models`: `RequestIdentity`
//! - `error`: authentication error codes (4001-4013)

pub mod error;
pub mod legacy;
pub mod middleware;
pub mod models;
pub mod replay;
pub mod signature;
pub mod uid_mapper;

// Re-export for convenience
pub use error::{AuthError, AuthErrorCode};
pub use legacy::{DEFAULT_LEGACY_SCHEME, LegacyClaims, parse_legacy_header};
pub use middleware::{
    AuthDispatcher, AuthRequest, BEARER_SCHEME, DispatcherError, auth_middleware,
    extract_bearer_token,
};
pub use models::{AuthMethod, RequestIdentity};
pub use replay::{ReplayGuard, SignatureReplayCache};
pub use signature::{DATE_HEADER, HMAC_SCHEME, build_string_to_sign, sign, verify};
pub use uid_mapper::{DirectUidMapper, DirectoryUidMapper, ExternalIdMapper, MapperError};
