//! Authentication dispatcher and its Axum middleware.
//!
//! One pass per request, exactly one branch runs:
//!
//! 1. `X-Date` present: HMAC signature over the received method, path,
//!    timestamp and body.
//! 2. `Authorization` uses the legacy scheme: parse the stub claims and map
//!    the external uid to a tenant.
//! 3. Anything else is rejected as an unsupported method.
//!
//! An HMAC failure never falls through to the legacy branch.

use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Request, header::AUTHORIZATION};
use axum::{body::Body, middleware::Next, response::Response};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{
    error::{AuthError, AuthErrorCode},
    legacy,
    models::RequestIdentity,
    replay::{ReplayGuard, SignatureReplayCache},
    signature::{self, DATE_HEADER, HMAC_SCHEME},
    uid_mapper::{ExternalIdMapper, MapperError},
};
use crate::account::AccountLookup;
use crate::error::with_deadline;

/// Scheme token of the bearer validation endpoints.
pub const BEARER_SCHEME: &str = "Bearer";

/// Default deadline for account lookups.
pub const DEFAULT_STORE_DEADLINE: Duration = Duration::from_secs(2);

/// Default request body limit for signed requests.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Dispatcher construction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatcherError {
    #[error("legacy scheme must be a single non-empty token, got {0:?}")]
    InvalidScheme(String),

    #[error("legacy scheme {0:?} collides with another authentication scheme")]
    SchemeCollision(String),
}

/// The request fields authentication looks at.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub authorization: Option<&'a str>,
    pub date: Option<&'a str>,
    pub body: &'a str,
}

/// Selects and runs one authentication scheme per request.
pub struct AuthDispatcher {
    accounts: Arc<dyn AccountLookup>,
    mapper: Arc<dyn ExternalIdMapper>,
    guard: ReplayGuard,
    replay_cache: Option<Arc<SignatureReplayCache>>,
    legacy_scheme: String,
    store_deadline: Duration,
    max_body_bytes: usize,
}

impl AuthDispatcher {
    /// Create a dispatcher.
    ///
    /// Fails if the legacy scheme could match the same header as the HMAC or
    /// bearer branches.
    pub fn new(
        accounts: Arc<dyn AccountLookup>,
        mapper: Arc<dyn ExternalIdMapper>,
        guard: ReplayGuard,
        legacy_scheme: impl Into<String>,
    ) -> Result<Self, DispatcherError> {
        let legacy_scheme = legacy_scheme.into();
        validate_legacy_scheme(&legacy_scheme)?;
        Ok(Self {
            accounts,
            mapper,
            guard,
            replay_cache: None,
            legacy_scheme,
            store_deadline: DEFAULT_STORE_DEADLINE,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Reject signatures already accepted inside the tolerance window.
    pub fn with_replay_cache(mut self, cache: Arc<SignatureReplayCache>) -> Self {
        self.replay_cache = Some(cache);
        self
    }

    pub fn with_store_deadline(mut self, deadline: Duration) -> Self {
        self.store_deadline = deadline;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn legacy_scheme(&self) -> &str {
        &self.legacy_scheme
    }

    /// Authenticate against the current time.
    pub async fn authenticate(&self, req: &AuthRequest<'_>) -> Result<RequestIdentity, AuthError> {
        self.authenticate_at(req, Utc::now()).await
    }

    /// Authenticate with an explicit "now".
    pub async fn authenticate_at(
        &self,
        req: &AuthRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<RequestIdentity, AuthError> {
        if let Some(date) = req.date {
            let header = req
                .authorization
                .ok_or_else(|| AuthError::from_code(AuthErrorCode::MissingAuth))?;
            return self.authenticate_hmac(req, header, date, now).await;
        }

        let header = req
            .authorization
            .ok_or_else(|| AuthError::from_code(AuthErrorCode::MissingAuth))?;

        if legacy::matches_scheme(header, &self.legacy_scheme) {
            return self.authenticate_legacy(header).await;
        }

        if legacy::matches_scheme(header, HMAC_SCHEME) {
            return Err(AuthError::new(
                AuthErrorCode::InvalidTimestamp,
                format!("missing {} header for HMAC authentication", DATE_HEADER),
            ));
        }

        Err(AuthError::from_code(AuthErrorCode::UnsupportedMethod))
    }

    async fn authenticate_hmac(
        &self,
        req: &AuthRequest<'_>,
        header: &str,
        date: &str,
        now: DateTime<Utc>,
    ) -> Result<RequestIdentity, AuthError> {
        let (access_key, received_signature) = signature::parse_authorization_header(header)?;

        let account = with_deadline(
            self.store_deadline,
            self.accounts.get_by_access_key(access_key),
        )
        .await
        .map_err(|e| {
            tracing::error!(access_key, error = %e, "account lookup failed");
            AuthError::from_code(AuthErrorCode::InternalError)
        })?
        .ok_or_else(|| AuthError::from_code(AuthErrorCode::UnknownAccessKey))?;

        if !account.is_active() {
            return Err(AuthError::from_code(AuthErrorCode::AccountSuspended));
        }

        let signed_at = self.guard.validate_timestamp_at(date, now)?;

        let string_to_sign = signature::build_string_to_sign(req.method, req.path, date, req.body);
        if !signature::verify(&account.secret_key, received_signature, &string_to_sign) {
            return Err(AuthError::from_code(AuthErrorCode::InvalidSignature));
        }

        if let Some(cache) = &self.replay_cache {
            let expires_at = signed_at
                .checked_add_signed(self.guard.tolerance())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if !cache.check_and_record(
                access_key,
                received_signature,
                expires_at.timestamp_millis(),
                now.timestamp_millis(),
            ) {
                return Err(AuthError::from_code(AuthErrorCode::SignatureReplayed));
            }
        }

        Ok(RequestIdentity::hmac(account.id, access_key))
    }

    async fn authenticate_legacy(&self, header: &str) -> Result<RequestIdentity, AuthError> {
        let claims = legacy::parse_legacy_header(header, &self.legacy_scheme)?;

        let account_id = with_deadline(self.store_deadline, async {
            Ok(self.mapper.resolve(claims.uid, claims.email.as_deref()).await)
        })
        .await
        .map_err(|e| {
            tracing::error!(uid = claims.uid, error = %e, "uid mapping timed out");
            AuthError::from_code(AuthErrorCode::InternalError)
        })?
        .map_err(|e| match e {
            MapperError::Store(store) => {
                tracing::error!(uid = claims.uid, error = %store, "uid directory failed");
                AuthError::from_code(AuthErrorCode::InternalError)
            }
            other => AuthError::new(
                AuthErrorCode::UidMappingFailed,
                format!("failed to map uid to account: {}", other),
            ),
        })?;

        let mut identity = RequestIdentity::legacy(account_id, claims.uid);
        identity.sub_identity = claims.iam_uid;
        identity.email = claims.email;
        Ok(identity)
    }
}

fn validate_legacy_scheme(scheme: &str) -> Result<(), DispatcherError> {
    if scheme.is_empty() || scheme.chars().any(char::is_whitespace) {
        return Err(DispatcherError::InvalidScheme(scheme.to_string()));
    }
    if scheme.eq_ignore_ascii_case(HMAC_SCHEME) || scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(DispatcherError::SchemeCollision(scheme.to_string()));
    }
    Ok(())
}

/// Axum middleware running the dispatcher.
///
/// Buffers the body (up to the configured limit) for signed requests so the
/// signature covers the exact received bytes, then re-attaches it. Inserts
/// `RequestIdentity` into the request extensions.
pub async fn auth_middleware(
    State(dispatcher): State<Arc<AuthDispatcher>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();

    let (body, buffered) = if parts.headers.contains_key(DATE_HEADER) {
        let bytes = axum::body::to_bytes(body, dispatcher.max_body_bytes())
            .await
            .map_err(|_| AuthError::new(AuthErrorCode::InvalidFormat, "request body too large"))?;
        (Body::from(bytes.clone()), Some(bytes))
    } else {
        (body, None)
    };

    let body_text = match &buffered {
        Some(bytes) => std::str::from_utf8(bytes).map_err(|_| {
            AuthError::new(
                AuthErrorCode::InvalidFormat,
                "signed request body must be UTF-8",
            )
        })?,
        None => "",
    };

    // Nested routers strip their prefix from `uri`; sign over the full path.
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let auth_request = AuthRequest {
        method: parts.method.as_str(),
        path: &path,
        authorization: header_str(&parts.headers, AUTHORIZATION.as_str()),
        date: header_str(&parts.headers, DATE_HEADER),
        body: body_text,
    };

    let identity = match dispatcher.authenticate(&auth_request).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(
                method = auth_request.method,
                path = auth_request.path,
                code = e.code.name(),
                "authentication rejected: {}",
                e.message
            );
            return Err(e);
        }
    };

    tracing::debug!(
        account_id = %identity.account_id,
        method = identity.method.as_str(),
        "request authenticated"
    );
    parts.extensions.insert(identity);

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Read a header as UTF-8, treating non-text values as absent.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = header_str(headers, AUTHORIZATION.as_str())
        .ok_or_else(|| AuthError::from_code(AuthErrorCode::MissingAuth))?;
    header
        .strip_prefix(BEARER_SCHEME)
        .and_then(|rest| rest.strip_prefix(' '))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::new(AuthErrorCode::InvalidFormat, "invalid authorization header"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_auth::legacy::DEFAULT_LEGACY_SCHEME;
    use crate::account::{Account, AccountStatus, MemoryAccountStore};
    use crate::api_auth::models::AuthMethod;
    use crate::api_auth::uid_mapper::{DirectUidMapper, DirectoryUidMapper};

    const AK: &str = "AK_0123456789ABCDEF";
    const SECRET: &str = "s3cr3t";

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn dispatcher_with(store: Arc<MemoryAccountStore>) -> AuthDispatcher {
        AuthDispatcher::new(
            store,
            Arc::new(DirectUidMapper),
            ReplayGuard::default(),
            DEFAULT_LEGACY_SCHEME,
        )
        .unwrap()
    }

    fn dispatcher() -> AuthDispatcher {
        let store = Arc::new(MemoryAccountStore::new());
        store.insert(Account::new("acc_1", AK, SECRET)).unwrap();
        dispatcher_with(store)
    }

    fn signed_header(method: &str, path: &str, date: &str, body: &str) -> String {
        let sts = signature::build_string_to_sign(method, path, date, body);
        format!("QINIU {}:{}", AK, signature::sign(SECRET, &sts))
    }

    fn request<'a>(auth: Option<&'a str>, date: Option<&'a str>, body: &'a str) -> AuthRequest<'a> {
        AuthRequest {
            method: "GET",
            path: "/api/v2/tokens",
            authorization: auth,
            date,
            body,
        }
    }

    #[tokio::test]
    async fn test_hmac_end_to_end_within_tolerance() {
        let d = dispatcher();
        let date = "2025-01-01T00:00:00Z";
        let header = signed_header("GET", "/api/v2/tokens", date, "");
        assert_eq!(
            header,
            format!("QINIU {}:h7XPMk7ovrxcHWx0OhZ5ysloUvf/lZ++yDn/28Hxv0E=", AK)
        );

        let identity = d
            .authenticate_at(&request(Some(&header), Some(date), ""), at("2025-01-01T00:10:00Z"))
            .await
            .unwrap();
        assert_eq!(identity.account_id, "acc_1");
        assert_eq!(identity.method, AuthMethod::Hmac);
        assert_eq!(identity.access_key.as_deref(), Some(AK));
    }

    #[tokio::test]
    async fn test_hmac_expired_timestamp() {
        let d = dispatcher();
        let date = "2025-01-01T00:00:00Z";
        let header = signed_header("GET", "/api/v2/tokens", date, "");
        let err = d
            .authenticate_at(&request(Some(&header), Some(date), ""), at("2025-01-01T00:20:00Z"))
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::TimestampExpired);
    }

    #[tokio::test]
    async fn test_hmac_tampered_body() {
        let d = dispatcher();
        let date = "2025-01-01T00:00:00Z";
        let header = signed_header("GET", "/api/v2/tokens", date, "{\"a\":1}");
        let err = d
            .authenticate_at(
                &request(Some(&header), Some(date), "{\"a\": 1}"),
                at("2025-01-01T00:00:01Z"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidSignature);
    }

    #[tokio::test]
    async fn test_hmac_unknown_key() {
        let d = dispatcher();
        let date = "2025-01-01T00:00:00Z";
        let header = "QINIU AK_UNKNOWN:c2ln";
        let err = d
            .authenticate_at(&request(Some(header), Some(date), ""), at(date))
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::UnknownAccessKey);
    }

    #[tokio::test]
    async fn test_hmac_suspended_account() {
        let store = Arc::new(MemoryAccountStore::new());
        store
            .insert(Account::new("acc_1", AK, SECRET).with_status(AccountStatus::Suspended))
            .unwrap();
        let d = dispatcher_with(store);
        let date = "2025-01-01T00:00:00Z";
        let header = signed_header("GET", "/api/v2/tokens", date, "");
        let err = d
            .authenticate_at(&request(Some(&header), Some(date), ""), at(date))
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::AccountSuspended);
    }

    #[tokio::test]
    async fn test_hmac_failure_does_not_fall_back_to_legacy() {
        let d = dispatcher();
        let err = d
            .authenticate_at(
                &request(Some("QiniuStub uid=1"), Some("2025-01-01T00:00:00Z"), ""),
                at("2025-01-01T00:00:00Z"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidFormat);
    }

    #[tokio::test]
    async fn test_date_without_authorization() {
        let d = dispatcher();
        let err = d
            .authenticate_at(&request(None, Some("2025-01-01T00:00:00Z"), ""), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::MissingAuth);
    }

    #[tokio::test]
    async fn test_replay_cache_rejects_second_presentation() {
        let d = dispatcher().with_replay_cache(Arc::new(SignatureReplayCache::new()));
        let date = "2025-01-01T00:00:00Z";
        let header = signed_header("GET", "/api/v2/tokens", date, "");
        let req = request(Some(&header), Some(date), "");

        assert!(d.authenticate_at(&req, at(date)).await.is_ok());
        let err = d
            .authenticate_at(&req, at("2025-01-01T00:00:05Z"))
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::SignatureReplayed);
    }

    #[tokio::test]
    async fn test_without_replay_cache_replays_are_accepted() {
        let d = dispatcher();
        let date = "2025-01-01T00:00:00Z";
        let header = signed_header("GET", "/api/v2/tokens", date, "");
        let req = request(Some(&header), Some(date), "");
        assert!(d.authenticate_at(&req, at(date)).await.is_ok());
        assert!(d.authenticate_at(&req, at(date)).await.is_ok());
    }

    #[tokio::test]
    async fn test_legacy_direct_mapping() {
        let d = dispatcher();
        let identity = d
            .authenticate(&request(Some("QiniuStub uid=12345&ut=1&iuid=99"), None, ""))
            .await
            .unwrap();
        assert_eq!(identity.account_id, "qiniu_12345");
        assert_eq!(identity.method, AuthMethod::Legacy);
        assert_eq!(identity.external_id, Some(12345));
        assert_eq!(identity.sub_identity.as_deref(), Some("99"));
    }

    #[tokio::test]
    async fn test_legacy_zero_uid_rejected() {
        let d = dispatcher();
        let err = d
            .authenticate(&request(Some("QiniuStub uid=0"), None, ""))
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::UidMappingFailed);
    }

    #[tokio::test]
    async fn test_legacy_lookup_without_auto_create() {
        let store = Arc::new(MemoryAccountStore::new());
        let d = AuthDispatcher::new(
            store.clone(),
            Arc::new(DirectoryUidMapper::new(store, false)),
            ReplayGuard::default(),
            DEFAULT_LEGACY_SCHEME,
        )
        .unwrap();
        let err = d
            .authenticate(&request(Some("QiniuStub uid=5"), None, ""))
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::UidMappingFailed);
    }

    #[tokio::test]
    async fn test_hmac_scheme_without_date() {
        let d = dispatcher();
        let err = d
            .authenticate(&request(Some("QINIU AK:sig"), None, ""))
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidTimestamp);
        assert!(err.message.contains("X-Date"));
    }

    #[tokio::test]
    async fn test_unsupported_and_missing() {
        let d = dispatcher();
        let err = d
            .authenticate(&request(Some("Bearer sk-abc"), None, ""))
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::UnsupportedMethod);

        let err = d.authenticate(&request(None, None, "")).await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::MissingAuth);
    }

    #[test]
    fn test_colliding_legacy_scheme_is_rejected() {
        let store: Arc<MemoryAccountStore> = Arc::new(MemoryAccountStore::new());
        for scheme in ["QINIU", "qiniu", "Bearer"] {
            let result = AuthDispatcher::new(
                store.clone(),
                Arc::new(DirectUidMapper),
                ReplayGuard::default(),
                scheme,
            );
            assert!(matches!(result, Err(DispatcherError::SchemeCollision(_))));
        }
        for scheme in ["", "Qiniu Stub"] {
            let result = AuthDispatcher::new(
                store.clone(),
                Arc::new(DirectUidMapper),
                ReplayGuard::default(),
                scheme,
            );
            assert!(matches!(result, Err(DispatcherError::InvalidScheme(_))));
        }
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            extract_bearer_token(&headers).unwrap_err().code,
            AuthErrorCode::MissingAuth
        );

        headers.insert(AUTHORIZATION, "Bearer sk-abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).unwrap(), "sk-abc");

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_err());
    }
}
