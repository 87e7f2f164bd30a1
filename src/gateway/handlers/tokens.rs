//! Token management handlers (owner-authenticated)
//!
//! Every handler runs behind the authentication middleware and scopes its
//! work to the caller's tenant.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::super::state::AppState;
use super::super::types::{ApiResult, created, ok};
use crate::api_auth::RequestIdentity;
use crate::token::{
    CreateTokenRequest, CreatedToken, TokenBrief, TokenList, TokenStats, page_filter,
};

/// Query parameters of `GET /api/v2/tokens`
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListTokensQuery {
    /// Only active tokens
    #[serde(default)]
    pub active_only: bool,
    /// Page size, default 50, max 100
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTokenStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedToken {
    pub token_id: String,
}

/// Create a token
///
/// POST /api/v2/tokens
#[utoipa::path(
    post,
    path = "/api/v2/tokens",
    request_body = CreateTokenRequest,
    responses(
        (status = 201, description = "Token created; the only response carrying the full value", body = CreatedToken),
        (status = 400, description = "Invalid description, scope, prefix or expiry"),
        (status = 401, description = "Authentication failed")
    ),
    security(("hmac_auth" = []), ("legacy_auth" = [])),
    tag = "Tokens"
)]
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<RequestIdentity>,
    Json(request): Json<CreateTokenRequest>,
) -> ApiResult<CreatedToken> {
    let token = state.tokens.create(&identity, request).await?;
    created(token)
}

/// List the caller's tokens
///
/// GET /api/v2/tokens?active_only=true&limit=50&offset=0
#[utoipa::path(
    get,
    path = "/api/v2/tokens",
    params(ListTokensQuery),
    responses(
        (status = 200, description = "Masked tokens, newest first", body = TokenList),
        (status = 401, description = "Authentication failed")
    ),
    security(("hmac_auth" = []), ("legacy_auth" = [])),
    tag = "Tokens"
)]
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<RequestIdentity>,
    Query(query): Query<ListTokensQuery>,
) -> ApiResult<TokenList> {
    let filter = page_filter(query.active_only, query.limit, query.offset);
    ok(state.tokens.list(&identity.account_id, filter).await?)
}

/// Get one token
///
/// GET /api/v2/tokens/{token_id}
#[utoipa::path(
    get,
    path = "/api/v2/tokens/{token_id}",
    params(("token_id" = String, Path, description = "Token id")),
    responses(
        (status = 200, description = "Token with masked value", body = TokenBrief),
        (status = 404, description = "No such token for this tenant")
    ),
    security(("hmac_auth" = []), ("legacy_auth" = [])),
    tag = "Tokens"
)]
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<RequestIdentity>,
    Path(token_id): Path<String>,
) -> ApiResult<TokenBrief> {
    ok(state.tokens.get(&identity.account_id, &token_id).await?)
}

/// Enable or disable a token
///
/// PUT /api/v2/tokens/{token_id}/status
#[utoipa::path(
    put,
    path = "/api/v2/tokens/{token_id}/status",
    params(("token_id" = String, Path, description = "Token id")),
    request_body = UpdateTokenStatusRequest,
    responses(
        (status = 200, description = "Updated token", body = TokenBrief),
        (status = 404, description = "No such token for this tenant")
    ),
    security(("hmac_auth" = []), ("legacy_auth" = [])),
    tag = "Tokens"
)]
pub async fn update_token_status(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<RequestIdentity>,
    Path(token_id): Path<String>,
    Json(request): Json<UpdateTokenStatusRequest>,
) -> ApiResult<TokenBrief> {
    ok(state
        .tokens
        .update_status(&identity.account_id, &token_id, request.is_active)
        .await?)
}

/// Delete a token
///
/// DELETE /api/v2/tokens/{token_id}
#[utoipa::path(
    delete,
    path = "/api/v2/tokens/{token_id}",
    params(("token_id" = String, Path, description = "Token id")),
    responses(
        (status = 200, description = "Token deleted", body = DeletedToken),
        (status = 404, description = "No such token for this tenant")
    ),
    security(("hmac_auth" = []), ("legacy_auth" = [])),
    tag = "Tokens"
)]
pub async fn delete_token(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<RequestIdentity>,
    Path(token_id): Path<String>,
) -> ApiResult<DeletedToken> {
    state.tokens.delete(&identity.account_id, &token_id).await?;
    ok(DeletedToken { token_id })
}

/// Usage counters of a token
///
/// GET /api/v2/tokens/{token_id}/stats
#[utoipa::path(
    get,
    path = "/api/v2/tokens/{token_id}/stats",
    params(("token_id" = String, Path, description = "Token id")),
    responses(
        (status = 200, description = "Usage counters", body = TokenStats),
        (status = 404, description = "No such token for this tenant")
    ),
    security(("hmac_auth" = []), ("legacy_auth" = [])),
    tag = "Tokens"
)]
pub async fn token_stats(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<RequestIdentity>,
    Path(token_id): Path<String>,
) -> ApiResult<TokenStats> {
    ok(state.tokens.stats(&identity.account_id, &token_id).await?)
}
