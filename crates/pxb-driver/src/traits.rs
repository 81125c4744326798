use async_trait::async_trait;
use pxb_common::{EntityId, EntityKind, EntityStatus, HarnessResult};
use std::fmt;

/// Reference to another entity by kind and logical name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub name: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.kind, self.name)
    }
}

/// Creation request for any entity kind
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub kind: EntityKind,
    pub name: String,
    pub org_id: String,

    /// Caller-chosen uid; the control plane assigns one when absent
    pub uid: Option<EntityId>,

    /// Owning user, `None` for admin-owned entities
    pub owner: Option<String>,

    /// Entities this one references (a backup references its location and cluster)
    pub parents: Vec<EntityRef>,
}

impl CreateRequest {
    pub fn new(kind: EntityKind, name: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            org_id: org_id.into(),
            uid: None,
            owner: None,
            parents: Vec::new(),
        }
    }

    pub fn with_uid(mut self, uid: EntityId) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_parent(mut self, kind: EntityKind, name: impl Into<String>) -> Self {
        self.parents.push(EntityRef::new(kind, name));
        self
    }
}

/// One row of an enumerate call
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySummary {
    pub kind: EntityKind,
    pub name: String,
    pub id: EntityId,
    pub status: EntityStatus,
    pub owner: Option<String>,
}

/// Control plane operation, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Delete,
    GetUid,
    Status,
    Enumerate,
}

/// Backup control plane as seen by the harness
///
/// Missing entities are reported as `HarnessError::NotFound`.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create an entity and return the id the control plane assigned
    async fn create(&self, request: CreateRequest) -> HarnessResult<EntityId>;

    /// Delete an entity by name and id
    async fn delete(
        &self,
        kind: EntityKind,
        name: &str,
        id: &EntityId,
        org_id: &str,
    ) -> HarnessResult<()>;

    /// Look up the id of a named entity
    async fn get_uid(&self, kind: EntityKind, name: &str, org_id: &str) -> HarnessResult<EntityId>;

    /// Current status of a named entity
    async fn status(&self, kind: EntityKind, name: &str, org_id: &str)
        -> HarnessResult<EntityStatus>;

    /// All entities of a kind in an organization
    async fn enumerate(&self, kind: EntityKind, org_id: &str) -> HarnessResult<Vec<EntitySummary>>;

    /// Whether a named entity is still present
    async fn exists(&self, kind: EntityKind, name: &str, org_id: &str) -> HarnessResult<bool> {
        Ok(self
            .enumerate(kind, org_id)
            .await?
            .iter()
            .any(|summary| summary.name == name))
    }
}
