//! HMAC-SHA256 request signing.
//!
//! Signer and verifier must agree byte-for-byte on the string-to-sign:
//!
//! ```text
//! {METHOD}\n{PATH}\n{X-Date}\n{BODY}
//! ```
//!
//! The signature is the standard base64 encoding of
//! `HMAC-SHA256(secret_key, string_to_sign)` and travels in
//! `Authorization: QINIU {access_key}:{signature}`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::{AuthError, AuthErrorCode};

type HmacSha256 = Hmac<Sha256>;

/// Authorization scheme token of the HMAC path.
pub const HMAC_SCHEME: &str = "QINIU";

/// Header carrying the signed request timestamp.
pub const DATE_HEADER: &str = "X-Date";

/// Build the canonical string-to-sign.
pub fn build_string_to_sign(method: &str, path: &str, timestamp: &str, body: &str) -> String {
    format!("{}\n{}\n{}\n{}", method, path, timestamp, body)
}

/// Parse `QINIU {access_key}:{signature}`.
///
/// Splits on the first colon after the scheme token, so base64 padding or
/// additional colons stay in the signature part.
pub fn parse_authorization_header(header: &str) -> Result<(&str, &str), AuthError> {
    let credentials = header
        .strip_prefix(HMAC_SCHEME)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| {
            AuthError::new(
                AuthErrorCode::InvalidFormat,
                "invalid authorization header format",
            )
        })?;

    let (access_key, signature) = credentials.split_once(':').ok_or_else(|| {
        AuthError::new(
            AuthErrorCode::InvalidFormat,
            "invalid authorization credentials format",
        )
    })?;

    if access_key.is_empty() || signature.is_empty() {
        return Err(AuthError::new(
            AuthErrorCode::InvalidFormat,
            "access key and signature must not be empty",
        ));
    }

    Ok((access_key, signature))
}

/// Compute the base64 HMAC-SHA256 signature of `string_to_sign`.
pub fn sign(secret_key: &str, string_to_sign: &str) -> String {
    // HMAC accepts keys of any length, the error branch is unreachable.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret_key.as_bytes()) else {
        return String::new();
    };
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Verify a received signature in constant time.
pub fn verify(secret_key: &str, received_signature: &str, string_to_sign: &str) -> bool {
    let expected = sign(secret_key, string_to_sign);
    if expected.is_empty() {
        return false;
    }
    expected
        .as_bytes()
        .ct_eq(received_signature.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cr3t";

    #[test]
    fn test_build_string_to_sign() {
        let sts = build_string_to_sign("GET", "/api/v2/tokens", "2025-01-01T00:00:00Z", "");
        assert_eq!(sts, "GET\n/api/v2/tokens\n2025-01-01T00:00:00Z\n");
    }

    #[test]
    fn test_build_string_to_sign_keeps_body_bytes() {
        let sts = build_string_to_sign("POST", "/p", "t", "{\"a\": 1}");
        assert!(sts.ends_with("\n{\"a\": 1}"));
    }

    #[test]
    fn test_parse_valid_header() {
        let (ak, sig) = parse_authorization_header("QINIU AK_test:c2lnbmF0dXJl").unwrap();
        assert_eq!(ak, "AK_test");
        assert_eq!(sig, "c2lnbmF0dXJl");
    }

    #[test]
    fn test_parse_splits_on_first_colon() {
        let (ak, sig) = parse_authorization_header("QINIU AK_test:abc:def=").unwrap();
        assert_eq!(ak, "AK_test");
        assert_eq!(sig, "abc:def=");
    }

    #[test]
    fn test_parse_rejects_malformed_headers() {
        for header in [
            "",
            "QINIU",
            "QINIU ",
            "QINIUAK_test:sig",
            "Bearer AK_test:sig",
            "QINIU AK_test",
            "QINIU :sig",
            "QINIU AK_test:",
        ] {
            let err = parse_authorization_header(header).unwrap_err();
            assert_eq!(err.code, AuthErrorCode::InvalidFormat, "header {:?}", header);
        }
    }

    #[test]
    fn test_sign_known_vector() {
        // Cross-checked with `openssl dgst -sha256 -hmac key -binary | base64`.
        let sig = sign("key", "The quick brown fox jumps over the lazy dog");
        assert_eq!(sig, "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg=");
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let sts = build_string_to_sign("POST", "/api/v2/tokens", "2025-01-01T00:00:00Z", "{}");
        let sig = sign(SECRET, &sts);
        assert!(verify(SECRET, &sig, &sts));
    }

    #[test]
    fn test_mutating_any_field_breaks_verification() {
        let base = ("POST", "/api/v2/tokens", "2025-01-01T00:00:00Z", "{\"x\":1}");
        let sts = build_string_to_sign(base.0, base.1, base.2, base.3);
        let sig = sign(SECRET, &sts);

        let mutated = [
            build_string_to_sign("PUT", base.1, base.2, base.3),
            build_string_to_sign(base.0, "/api/v2/tokenz", base.2, base.3),
            build_string_to_sign(base.0, base.1, "2025-01-01T00:00:01Z", base.3),
            build_string_to_sign(base.0, base.1, base.2, "{\"x\": 1}"),
        ];
        for m in mutated {
            assert!(!verify(SECRET, &sig, &m));
        }
    }

    #[test]
    fn test_verify_wrong_secret() {
        let sts = build_string_to_sign("GET", "/", "t", "");
        let sig = sign(SECRET, &sts);
        assert!(!verify("other", &sig, &sts));
    }

    #[test]
    fn test_verify_truncated_signature() {
        let sts = build_string_to_sign("GET", "/", "t", "");
        let sig = sign(SECRET, &sts);
        assert!(!verify(SECRET, &sig[..sig.len() - 1], &sts));
    }
}
