//! Gateway types module
//!
//! ## Submodules
//! - [`response`]: response envelope, handler errors and error codes

pub mod response;

// Re-export commonly used types at module root
pub use response::{ApiError, ApiResponse, ApiResult, created, error_codes, ok};
