//! OpenAPI documentation
//!
//! Served as JSON at `/api-docs/openapi.json`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::{DeletedToken, HealthResponse, UpdateTokenStatusRequest};
use crate::rate_limit::RateLimitPolicy;
use crate::token::{
    CreateTokenRequest, CreatedToken, TokenBrief, TokenInfo, TokenList, TokenStats, TokenStatus,
    UserInfo, ValidateRequest, ValidateResponse,
};

/// Owner (HMAC / legacy) and bearer security schemes
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "hmac_auth",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    r#"HMAC-SHA256 signature: QINIU {access_key}:{signature}

Requires an X-Date header (RFC3339, within 15 minutes of server time).
String to sign: {method}\n{path}\n{x_date}\n{body}
Signature: base64(hmac_sha256(secret_key, string_to_sign))"#,
                ))),
            );
            components.add_security_scheme(
                "legacy_auth",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    "Legacy stub: QiniuStub uid={uid}&ut={user_type}[&iuid={iam_uid}]",
                ))),
            );
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bearer Token Service API",
        version = "2.0.0",
        description = "Issues and validates bearer tokens for a multi-tenant API platform."
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::create_token,
        crate::gateway::handlers::list_tokens,
        crate::gateway::handlers::get_token,
        crate::gateway::handlers::update_token_status,
        crate::gateway::handlers::delete_token,
        crate::gateway::handlers::token_stats,
        crate::gateway::handlers::validate_token,
        crate::gateway::handlers::validate_token_with_user_info,
    ),
    components(
        schemas(
            HealthResponse,
            CreateTokenRequest,
            CreatedToken,
            TokenBrief,
            TokenList,
            TokenStats,
            TokenStatus,
            RateLimitPolicy,
            UpdateTokenStatusRequest,
            DeletedToken,
            ValidateRequest,
            ValidateResponse,
            TokenInfo,
            UserInfo,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Tokens", description = "Token management (HMAC or legacy auth required)"),
        (name = "Validation", description = "Bearer token validation"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;
