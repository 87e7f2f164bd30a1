//! External id to tenant id mapping.
//!
//! - `DirectUidMapper`: deterministic `qiniu_{uid}`
//! - `DirectoryUidMapper`: lookup in a `LegacyAccountDirectory`, optionally
//!   creating the tenant on first sight

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::account::LegacyAccountDirectory;
use crate::error::StoreError;

/// Tenant id prefix produced by the direct strategy.
pub const LEGACY_TENANT_PREFIX: &str = "qiniu_";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapperError {
    #[error("invalid external uid: 0")]
    ZeroUid,

    #[error("account not found for uid {0}")]
    NotFound(u32),

    #[error("failed to create account for uid {uid}: {source}")]
    CreateFailed { uid: u32, source: StoreError },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolve an external numeric id to a tenant id.
#[async_trait]
pub trait ExternalIdMapper: Send + Sync {
    async fn resolve(&self, uid: u32, email: Option<&str>) -> Result<String, MapperError>;
}

/// `uid -> "qiniu_{uid}"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectUidMapper;

#[async_trait]
impl ExternalIdMapper for DirectUidMapper {
    async fn resolve(&self, uid: u32, _email: Option<&str>) -> Result<String, MapperError> {
        if uid == 0 {
            return Err(MapperError::ZeroUid);
        }
        Ok(format!("{}{}", LEGACY_TENANT_PREFIX, uid))
    }
}

/// Directory lookup with optional auto-create.
pub struct DirectoryUidMapper {
    directory: Arc<dyn LegacyAccountDirectory>,
    auto_create: bool,
}

impl DirectoryUidMapper {
    pub fn new(directory: Arc<dyn LegacyAccountDirectory>, auto_create: bool) -> Self {
        Self {
            directory,
            auto_create,
        }
    }
}

#[async_trait]
impl ExternalIdMapper for DirectoryUidMapper {
    async fn resolve(&self, uid: u32, email: Option<&str>) -> Result<String, MapperError> {
        if uid == 0 {
            return Err(MapperError::ZeroUid);
        }

        if let Some(account_id) = self.directory.find_by_uid(uid).await? {
            return Ok(account_id);
        }

        if !self.auto_create {
            return Err(MapperError::NotFound(uid));
        }

        let account_id = self
            .directory
            .create_for_uid(uid, email)
            .await
            .map_err(|source| MapperError::CreateFailed { uid, source })?;
        tracing::info!(uid, account_id = %account_id, "created tenant for external uid");
        Ok(account_id)
    }
}

/// Extract the external uid from a tenant id of the form `qiniu_{uid}`.
pub fn uid_from_tenant_id(account_id: &str) -> Option<u32> {
    account_id
        .strip_prefix(LEGACY_TENANT_PREFIX)
        .and_then(|uid| uid.parse().ok())
}
