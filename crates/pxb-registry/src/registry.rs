use dashmap::DashMap;
use pxb_common::{EntityId, EntityKind, EntityRecord};
use std::collections::HashMap;
use tracing::debug;

type RegistryKey = (EntityKind, String);

/// Concurrent map from `(kind, logical name)` to the record the control
/// plane returned on creation.
///
/// The map is safe to share across tasks, but a reader is only guaranteed
/// to see an id once the writer's `put` has returned; callers order
/// creation before use with a barrier such as awaiting the creating batch.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entries: DashMap<RegistryKey, EntityRecord>,

    /// Owner stamped onto records added through [`EntityRegistry::put`]
    owner: Option<String>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose records belong to `owner`
    pub fn for_owner(owner: impl Into<String>) -> Self {
        Self {
            entries: DashMap::new(),
            owner: Some(owner.into()),
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Record `name -> id`, returning the id it replaced
    pub fn put(&self, kind: EntityKind, name: impl Into<String>, id: EntityId) -> Option<EntityId> {
        let mut record = EntityRecord::new(kind, name, id);
        record.owner = self.owner.clone();
        self.insert(record).map(|previous| previous.id)
    }

    pub fn insert(&self, record: EntityRecord) -> Option<EntityRecord> {
        debug!("Registering {} {} -> {}", record.kind, record.name, record.id);
        self.entries
            .insert((record.kind, record.name.clone()), record)
    }

    pub fn get(&self, kind: EntityKind, name: &str) -> Option<EntityId> {
        self.entries
            .get(&(kind, name.to_string()))
            .map(|entry| entry.id.clone())
    }

    pub fn record(&self, kind: EntityKind, name: &str) -> Option<EntityRecord> {
        self.entries
            .get(&(kind, name.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, kind: EntityKind, name: &str) -> bool {
        self.entries.contains_key(&(kind, name.to_string()))
    }

    pub fn delete(&self, kind: EntityKind, name: &str) -> Option<EntityRecord> {
        let removed = self.entries.remove(&(kind, name.to_string())).map(|(_, r)| r);
        if removed.is_some() {
            debug!("Unregistered {} {}", kind, name);
        }
        removed
    }

    /// Point-in-time copy of every record, oldest first
    pub fn items(&self) -> Vec<EntityRecord> {
        let mut items: Vec<EntityRecord> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        items.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.kind.cmp(&b.kind))
                .then(a.name.cmp(&b.name))
        });
        items
    }

    pub fn items_of(&self, kind: EntityKind) -> Vec<EntityRecord> {
        self.items().into_iter().filter(|r| r.kind == kind).collect()
    }

    /// `id -> name` for one kind, the shape location and cluster cleanup takes
    pub fn names_by_id(&self, kind: EntityKind) -> HashMap<EntityId, String> {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| (entry.id.clone(), entry.name.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
