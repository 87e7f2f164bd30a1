//! Bearer token validation handlers
//!
//! - 200: usable token
//! - 401: missing, unknown, inactive or expired
//! - 403: insufficient scope, with `missing_scopes`
//! - 429: token-level rate limit

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use super::super::state::AppState;
use crate::api_auth::extract_bearer_token;
use crate::error::StoreError;
use crate::rate_limit::{apply_limit_headers, rejection_response};
use crate::token::{ValidateRequest, ValidateResponse, ValidationOutcome};

/// Parse the optional JSON body. An empty body requires no scopes.
fn parse_request(body: &Bytes) -> Result<ValidateRequest, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ValidateRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ValidateResponse::invalid(format!("invalid request body: {}", e))),
        )
            .into_response()
    })
}

fn into_response(result: Result<ValidationOutcome, StoreError>) -> Response {
    match result {
        Ok(ValidationOutcome::Valid { response, limit }) => {
            let mut http = (StatusCode::OK, Json(response)).into_response();
            if let Some(decision) = limit {
                apply_limit_headers(http.headers_mut(), &decision);
            }
            http
        }
        Ok(ValidationOutcome::Invalid(response)) => {
            (StatusCode::UNAUTHORIZED, Json(response)).into_response()
        }
        Ok(ValidationOutcome::Forbidden(response)) => {
            (StatusCode::FORBIDDEN, Json(response)).into_response()
        }
        Ok(ValidationOutcome::RateLimited(decision)) => rejection_response(&decision),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ValidateResponse::invalid("internal error")),
        )
            .into_response(),
    }
}

fn bearer_or_401(headers: &HeaderMap) -> Result<&str, Response> {
    extract_bearer_token(headers).map_err(|e| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ValidateResponse::invalid(e.message)),
        )
            .into_response()
    })
}

/// Validate a bearer token
///
/// POST /api/v2/validate
#[utoipa::path(
    post,
    path = "/api/v2/validate",
    request_body(content = ValidateRequest, description = "Optional required scopes"),
    responses(
        (status = 200, description = "Token is valid", body = ValidateResponse),
        (status = 401, description = "Missing, unknown, inactive or expired token", body = ValidateResponse),
        (status = 403, description = "Insufficient scope", body = ValidateResponse),
        (status = 429, description = "Token rate limit exceeded")
    ),
    security(("bearer_auth" = [])),
    tag = "Validation"
)]
pub async fn validate_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = match bearer_or_401(&headers) {
        Ok(token) => token,
        Err(rejected) => return rejected,
    };
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(rejected) => return rejected,
    };
    into_response(state.validation.validate(token, &request.required()).await)
}

/// Validate a bearer token and attach the legacy user's profile
///
/// POST /api/v2/validateu
#[utoipa::path(
    post,
    path = "/api/v2/validateu",
    request_body(content = ValidateRequest, description = "Optional required scopes"),
    responses(
        (status = 200, description = "Token is valid; `user_info` present when available", body = ValidateResponse),
        (status = 401, description = "Missing, unknown, inactive or expired token", body = ValidateResponse),
        (status = 403, description = "Insufficient scope", body = ValidateResponse),
        (status = 429, description = "Token rate limit exceeded")
    ),
    security(("bearer_auth" = [])),
    tag = "Validation"
)]
pub async fn validate_token_with_user_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = match bearer_or_401(&headers) {
        Ok(token) => token,
        Err(rejected) => return rejected,
    };
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(rejected) => return rejected,
    };
    into_response(
        state
            .validation
            .validate_with_user_info(token, &request.required())
            .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_body() {
        assert!(parse_request(&Bytes::new()).unwrap().required().is_empty());
        assert!(parse_request(&Bytes::from_static(b"  \n")).is_ok());
    }

    #[test]
    fn test_parse_scopes() {
        let req = parse_request(&Bytes::from_static(br#"{"required_scopes":["a:b"]}"#)).unwrap();
        assert_eq!(req.required(), vec!["a:b".to_string()]);
    }

    #[test]
    fn test_parse_garbage_is_400() {
        let resp = parse_request(&Bytes::from_static(b"{nope")).unwrap_err();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_error_is_500() {
        let resp = into_response(Err(StoreError::Unavailable("db".into())));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
