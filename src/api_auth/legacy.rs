//! Legacy stub credential grammar.
//!
//! The canonical payload is URL-parameter style, without percent decoding:
//!
//! ```text
//! Authorization: QiniuStub uid=12345&ut=1
//! Authorization: QiniuStub uid=12345&ut=1&iuid=8901234&email=a@b.c
//! ```
//!
//! `uid` is required and must fit in a `u32`. Pairs without `=` and unknown
//! keys are ignored; malformed optional numbers are dropped.

use super::error::{AuthError, AuthErrorCode};

/// Default legacy scheme token.
pub const DEFAULT_LEGACY_SCHEME: &str = "QiniuStub";

/// Identity claims carried by a legacy stub header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyClaims {
    /// External numeric user id (main account)
    pub uid: u32,
    /// User type
    pub user_type: u32,
    pub app_id: Option<u64>,
    /// IAM sub-account id
    pub iam_uid: Option<String>,
    pub access_key: Option<String>,
    pub end_user: Option<String>,
    pub email: Option<String>,
}

/// Whether `header` uses `scheme` (`"{scheme} ..."`).
pub fn matches_scheme(header: &str, scheme: &str) -> bool {
    header
        .strip_prefix(scheme)
        .is_some_and(|rest| rest.starts_with(' '))
}

/// Parse `"{scheme} k=v&k=v..."` into claims.
pub fn parse_legacy_header(header: &str, scheme: &str) -> Result<LegacyClaims, AuthError> {
    let params = header
        .strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| invalid("invalid legacy token format"))?
        .trim();

    if params.is_empty() {
        return Err(invalid("empty legacy token params"));
    }

    let mut claims = LegacyClaims::default();
    let mut uid = None;

    for pair in params.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "uid" => uid = Some(value),
            "ut" => claims.user_type = value.parse().unwrap_or_default(),
            "app" => claims.app_id = value.parse().ok(),
            "iuid" => claims.iam_uid = non_empty(value),
            "ak" => claims.access_key = non_empty(value),
            "eu" => claims.end_user = non_empty(value),
            "email" => claims.email = non_empty(value),
            _ => {}
        }
    }

    let uid = uid
        .filter(|v| !v.is_empty())
        .ok_or_else(|| invalid("uid is required"))?;
    claims.uid = uid.parse().map_err(|_| invalid("invalid uid format"))?;

    Ok(claims)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn invalid(reason: &str) -> AuthError {
    AuthError::new(
        AuthErrorCode::InvalidLegacyToken,
        format!("invalid legacy token: {}", reason),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_main_account() {
        let claims = parse_legacy_header("QiniuStub uid=12345&ut=1", "QiniuStub").unwrap();
        assert_eq!(claims.uid, 12345);
        assert_eq!(claims.user_type, 1);
        assert_eq!(claims.iam_uid, None);
    }

    #[test]
    fn test_parse_iam_sub_account() {
        let claims = parse_legacy_header(
            "QiniuStub uid=12345&ut=1&iuid=8901234&email=dev@example.com&app=7",
            "QiniuStub",
        )
        .unwrap();
        assert_eq!(claims.uid, 12345);
        assert_eq!(claims.iam_uid.as_deref(), Some("8901234"));
        assert_eq!(claims.email.as_deref(), Some("dev@example.com"));
        assert_eq!(claims.app_id, Some(7));
    }

    #[test]
    fn test_ignores_unknown_and_malformed_pairs() {
        let claims =
            parse_legacy_header("QiniuStub foo=bar&junk&uid=9&ut=x&app=-1", "QiniuStub").unwrap();
        assert_eq!(claims.uid, 9);
        assert_eq!(claims.user_type, 0);
        assert_eq!(claims.app_id, None);
    }

    #[test]
    fn test_uid_required() {
        for header in ["QiniuStub ut=1", "QiniuStub uid=&ut=1", "QiniuStub    "] {
            let err = parse_legacy_header(header, "QiniuStub").unwrap_err();
            assert_eq!(err.code, AuthErrorCode::InvalidLegacyToken);
        }
    }

    #[test]
    fn test_uid_must_fit_u32() {
        for uid in ["abc", "-1", "4294967296"] {
            let header = format!("QiniuStub uid={}", uid);
            let err = parse_legacy_header(&header, "QiniuStub").unwrap_err();
            assert!(err.message.contains("invalid uid format"));
        }
        let claims = parse_legacy_header("QiniuStub uid=4294967295", "QiniuStub").unwrap();
        assert_eq!(claims.uid, u32::MAX);
    }

    #[test]
    fn test_matches_scheme() {
        assert!(matches_scheme("QiniuStub uid=1", "QiniuStub"));
        assert!(!matches_scheme("QiniuStubuid=1", "QiniuStub"));
        assert!(!matches_scheme("QINIU ak:sig", "QiniuStub"));
        assert!(matches_scheme("Internal uid=1", "Internal"));
    }
}
