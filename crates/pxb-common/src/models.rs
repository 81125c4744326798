use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of entity managed by the backup control plane
///
/// Declaration order is creation order; teardown runs in reverse of the
/// dependency graph declared by [`EntityKind::dependencies`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CloudCredential,
    BackupLocation,
    Cluster,
    SchedulePolicy,
    Rule,
    Schedule,
    Backup,
    Restore,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::CloudCredential,
        EntityKind::BackupLocation,
        EntityKind::Cluster,
        EntityKind::SchedulePolicy,
        EntityKind::Rule,
        EntityKind::Schedule,
        EntityKind::Backup,
        EntityKind::Restore,
    ];

    /// Kinds that must be torn down after this kind.
    ///
    /// Adding a variant fails to compile until its dependencies are declared.
    pub fn dependencies(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::CloudCredential => &[],
            EntityKind::BackupLocation => &[EntityKind::CloudCredential],
            EntityKind::Cluster => &[EntityKind::CloudCredential, EntityKind::BackupLocation],
            EntityKind::SchedulePolicy => &[],
            EntityKind::Rule => &[],
            EntityKind::Schedule => &[
                EntityKind::Cluster,
                EntityKind::BackupLocation,
                EntityKind::SchedulePolicy,
                EntityKind::Rule,
            ],
            EntityKind::Backup => &[
                EntityKind::Cluster,
                EntityKind::BackupLocation,
                EntityKind::Rule,
                EntityKind::Schedule,
            ],
            EntityKind::Restore => &[EntityKind::Backup, EntityKind::Cluster],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::CloudCredential => "cloud_credential",
            EntityKind::BackupLocation => "backup_location",
            EntityKind::Cluster => "cluster",
            EntityKind::SchedulePolicy => "schedule_policy",
            EntityKind::Rule => "rule",
            EntityKind::Schedule => "schedule",
            EntityKind::Backup => "backup",
            EntityKind::Restore => "restore",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("Invalid entity kind: {}", s))
    }
}

/// Opaque identifier assigned by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh UUIDv4 identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Locally cached record of an entity created during a test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Logical name chosen by the test
    pub name: String,

    /// Identifier assigned by the control plane
    pub id: EntityId,

    /// Entity kind
    pub kind: EntityKind,

    /// When the creation call returned
    pub created_at: DateTime<Utc>,

    /// User that owns the entity, if not the admin
    pub owner: Option<String>,
}

impl EntityRecord {
    pub fn new(kind: EntityKind, name: impl Into<String>, id: EntityId) -> Self {
        Self {
            name: name.into(),
            id,
            kind,
            created_at: Utc::now(),
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Status reported by the control plane for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EntityStatus {
    #[default]
    Pending,
    InProgress,
    Success,
    PartialSuccess,
    Failed,
    Aborted,
    Invalid,
    CloudBackupMissing,
    Deleting,
    Online,
    Offline,
}

impl EntityStatus {
    /// Whether the status can no longer change on its own
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntityStatus::Success
                | EntityStatus::PartialSuccess
                | EntityStatus::Failed
                | EntityStatus::Aborted
                | EntityStatus::Invalid
                | EntityStatus::CloudBackupMissing
        )
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Build a logical name unique by convention: `<prefix>-<unix ts>-<8 hex>`
pub fn unique_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, Utc::now().timestamp(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trip_names() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert_eq!(
            "Backup-Location".parse::<EntityKind>().unwrap(),
            EntityKind::BackupLocation
        );
        assert!("bucket".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_dependencies_point_to_earlier_kinds() {
        for kind in EntityKind::ALL {
            for dep in kind.dependencies() {
                assert!(dep < &kind, "{} depends on later kind {}", kind, dep);
            }
        }
    }

    #[test]
    fn test_entity_id_serializes_transparently() {
        let id = EntityId::new("abc-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-123\"");
        assert_eq!(EntityId::generate().as_str().len(), 36);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(EntityStatus::Success.is_terminal());
        assert!(EntityStatus::CloudBackupMissing.is_terminal());
        assert!(!EntityStatus::InProgress.is_terminal());
        assert!(!EntityStatus::Deleting.is_terminal());
    }

    #[test]
    fn test_unique_name_format() {
        let a = unique_name("autogenerated-cred");
        let b = unique_name("autogenerated-cred");
        assert!(a.starts_with("autogenerated-cred-"));
        assert_ne!(a, b);
        assert_eq!(a.rsplit('-').next().unwrap().len(), 8);
    }

    #[test]
    fn test_record_owner() {
        let record = EntityRecord::new(EntityKind::Backup, "bkp-1", EntityId::new("u1"))
            .with_owner("user-1");
        assert_eq!(record.owner.as_deref(), Some("user-1"));
        assert_eq!(record.kind, EntityKind::Backup);
    }
}
