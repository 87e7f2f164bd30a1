//! Random identifiers and credentials.
//!
//! All values are hex-encoded bytes from the OS CSPRNG.

use rand::RngCore;
use rand::rngs::OsRng;

/// Prefix used when a token is created without a custom prefix.
pub const DEFAULT_TOKEN_PREFIX: &str = "sk-";

/// Hex-encode `len` random bytes.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Token id: `tk_` + 32 hex chars.
pub fn token_id() -> String {
    format!("tk_{}", random_hex(16))
}

/// Token secret value: `{prefix}-` + 64 hex chars, or `sk-` + 64 hex chars.
pub fn token_value(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}-{}", p, random_hex(32)),
        _ => format!("{}{}", DEFAULT_TOKEN_PREFIX, random_hex(32)),
    }
}

/// Access key: `AK_` + 16 uppercase hex chars.
pub fn access_key() -> String {
    format!("AK_{}", random_hex(8).to_uppercase())
}

/// Secret key: 64 hex chars.
pub fn secret_key() -> String {
    random_hex(32)
}
