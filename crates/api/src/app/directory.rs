//! Back-office entities that carry a minted code.
//!
//! Only the code matters to this service, so the entities themselves are kept
//! in process memory. The counters behind the codes live in the sequence store.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use tablepos_core::{RequestContext, StoreId, TenantId, UserId};
use tablepos_sequence::{BusinessCode, SequenceError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackOfficeEntity {
    pub id: Uuid,
    pub kind: BusinessCode,
    pub code: String,
    pub name: String,
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl BackOfficeEntity {
    pub fn new(kind: BusinessCode, code: String, name: String, ctx: &RequestContext) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            code,
            name,
            tenant_id: ctx.tenant_id(),
            store_id: ctx.store_id(),
            created_by: ctx.user_id(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("{kind:?} code {code} is already taken")]
    DuplicateCode { kind: BusinessCode, code: String },

    #[error("directory storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Default)]
pub struct EntityDirectory {
    entries: RwLock<Vec<BackOfficeEntity>>,
}

impl EntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly minted entity; a code can be held once per tenant and kind.
    pub fn insert(&self, entity: BackOfficeEntity) -> Result<BackOfficeEntity, DirectoryError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;

        let taken = entries.iter().any(|e| {
            e.tenant_id == entity.tenant_id && e.kind == entity.kind && e.code == entity.code
        });
        if taken {
            return Err(DirectoryError::DuplicateCode {
                kind: entity.kind,
                code: entity.code,
            });
        }

        entries.push(entity.clone());
        Ok(entity)
    }

    pub fn list(
        &self,
        tenant_id: TenantId,
        kind: BusinessCode,
    ) -> Result<Vec<BackOfficeEntity>, DirectoryError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;

        Ok(entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.kind == kind)
            .cloned()
            .collect())
    }
}
