use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use pxb_common::{EntityId, EntityKind, EntityStatus, HarnessError, HarnessResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::traits::{ControlPlane, CreateRequest, EntityRef, EntitySummary, Operation};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntityKey {
    org_id: String,
    kind: EntityKind,
    name: String,
}

impl EntityKey {
    fn new(org_id: &str, kind: EntityKind, name: &str) -> Self {
        Self {
            org_id: org_id.to_string(),
            kind,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEntity {
    id: EntityId,
    status: EntityStatus,
    owner: Option<String>,
    parents: Vec<EntityRef>,

    /// Statuses reported by upcoming status probes, front first
    script: VecDeque<EntityStatus>,

    /// Probes left before a deleting entity disappears
    deleting_polls_left: Option<usize>,
}

#[derive(Debug, Clone)]
struct Fault {
    kind: Option<EntityKind>,
    operation: Operation,
    error: HarnessError,

    /// `None` fails forever
    remaining: Option<usize>,
}

/// In-memory control plane with fault injection
///
/// Enforces referential integrity: an entity with live dependents cannot be
/// deleted. Deletion can be made asynchronous with [`set_deletion_delay`],
/// in which case the entity reports `Deleting` for a number of probes.
///
/// [`set_deletion_delay`]: MemoryControlPlane::set_deletion_delay
#[derive(Default)]
pub struct MemoryControlPlane {
    entities: DashMap<EntityKey, StoredEntity>,
    progressions: DashMap<EntityKind, Vec<EntityStatus>>,
    faults: Mutex<Vec<Fault>>,
    latency: RwLock<Duration>,
    deletion_delay: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    deletions: Mutex<Vec<EntityRef>>,
}

/// Decrements the in-flight counter when an operation ends
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Delay applied to every call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Number of probes a deleted entity stays visible as `Deleting`
    pub fn set_deletion_delay(&self, probes: usize) {
        self.deletion_delay.store(probes, Ordering::SeqCst);
    }

    /// Statuses every new entity of `kind` walks through on successive probes
    pub fn set_progression(&self, kind: EntityKind, statuses: Vec<EntityStatus>) {
        self.progressions.insert(kind, statuses);
    }

    /// Script the statuses reported for one existing entity
    pub fn script_status(
        &self,
        org_id: &str,
        kind: EntityKind,
        name: &str,
        statuses: Vec<EntityStatus>,
    ) -> HarnessResult<()> {
        let mut entry = self
            .entities
            .get_mut(&EntityKey::new(org_id, kind, name))
            .ok_or_else(|| not_found(kind, name))?;
        entry.script = statuses.into();
        Ok(())
    }

    /// Fail the next `times` calls of `operation` (on `kind`, or any kind)
    pub fn inject_failure(
        &self,
        kind: Option<EntityKind>,
        operation: Operation,
        error: HarnessError,
        times: usize,
    ) {
        self.faults.lock().push(Fault {
            kind,
            operation,
            error,
            remaining: Some(times),
        });
    }

    /// Fail every call of `operation` until faults are cleared
    pub fn inject_persistent_failure(
        &self,
        kind: Option<EntityKind>,
        operation: Operation,
        error: HarnessError,
    ) {
        self.faults.lock().push(Fault {
            kind,
            operation,
            error,
            remaining: None,
        });
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Remove an entity behind the harness's back, ignoring dependents
    ///
    /// Removing a backup location leaves its backups in `CloudBackupMissing`,
    /// the way a deleted bucket does.
    pub fn remove_out_of_band(&self, org_id: &str, kind: EntityKind, name: &str) -> bool {
        let removed = self
            .entities
            .remove(&EntityKey::new(org_id, kind, name))
            .is_some();

        if removed && kind == EntityKind::BackupLocation {
            let parent = EntityRef::new(kind, name);
            for mut entry in self.entities.iter_mut() {
                if entry.key().org_id == org_id
                    && entry.key().kind == EntityKind::Backup
                    && entry.parents.contains(&parent)
                {
                    entry.status = EntityStatus::CloudBackupMissing;
                    entry.script.clear();
                }
            }
        }

        info!("Removed {} [{}] out of band: {}", kind, name, removed);
        removed
    }

    pub fn contains(&self, org_id: &str, kind: EntityKind, name: &str) -> bool {
        self.entities
            .contains_key(&EntityKey::new(org_id, kind, name))
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .count()
    }

    /// Successful delete calls, in call order
    pub fn deletions(&self) -> Vec<EntityRef> {
        self.deletions.lock().clone()
    }

    /// Highest number of simultaneously executing calls
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, kind: Option<EntityKind>, operation: Operation) -> HarnessResult<InFlight<'_>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.take_fault(kind, operation)?;
        Ok(guard)
    }

    fn take_fault(&self, kind: Option<EntityKind>, operation: Operation) -> HarnessResult<()> {
        let mut faults = self.faults.lock();
        let position = faults.iter().position(|fault| {
            fault.operation == operation
                && (fault.kind.is_none() || fault.kind == kind)
                && fault.remaining != Some(0)
        });

        let Some(position) = position else {
            return Ok(());
        };

        let fault = &mut faults[position];
        let error = fault.error.clone();
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                faults.remove(position);
            }
        }

        warn!("Injected failure for {:?} on {:?}: {}", operation, kind, error);
        Err(error)
    }

    /// Advance a deleting entity by one probe; returns false once it is gone
    fn observe(&self, key: &EntityKey) -> bool {
        let gone = match self.entities.get_mut(key) {
            Some(mut entry) => match entry.deleting_polls_left.as_mut() {
                Some(left) if *left <= 1 => true,
                Some(left) => {
                    *left -= 1;
                    false
                }
                None => false,
            },
            None => return false,
        };

        if gone {
            self.entities.remove(key);
            debug!("{} [{}] finished deleting", key.kind, key.name);
            return false;
        }
        true
    }

    fn dependents_of(&self, key: &EntityKey) -> Vec<EntityRef> {
        let target = EntityRef::new(key.kind, key.name.clone());
        self.entities
            .iter()
            .filter(|entry| entry.key().org_id == key.org_id && entry.parents.contains(&target))
            .map(|entry| EntityRef::new(entry.key().kind, entry.key().name.clone()))
            .collect()
    }
}

fn not_found(kind: EntityKind, name: &str) -> HarnessError {
    HarnessError::NotFound(format!("{} [{}]", kind, name))
}

fn initial_status(kind: EntityKind) -> EntityStatus {
    match kind {
        EntityKind::Cluster => EntityStatus::Online,
        _ => EntityStatus::Success,
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn create(&self, request: CreateRequest) -> HarnessResult<EntityId> {
        let _guard = self.enter(Some(request.kind), Operation::Create).await?;
        debug!("Creating {} [{}]", request.kind, request.name);

        for parent in &request.parents {
            let parent_key = EntityKey::new(&request.org_id, parent.kind, &parent.name);
            if !self.entities.contains_key(&parent_key) {
                return Err(HarnessError::NotFound(format!(
                    "{} referenced by {} [{}]",
                    parent, request.kind, request.name
                )));
            }
        }

        let key = EntityKey::new(&request.org_id, request.kind, &request.name);
        let id = request.uid.clone().unwrap_or_else(EntityId::generate);
        let mut script: VecDeque<EntityStatus> = self
            .progressions
            .get(&request.kind)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default();
        let status = script.pop_front().unwrap_or_else(|| initial_status(request.kind));

        match self.entities.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(HarnessError::AlreadyExists(format!(
                    "{} [{}]",
                    request.kind, request.name
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(StoredEntity {
                    id: id.clone(),
                    status,
                    owner: request.owner,
                    parents: request.parents,
                    script,
                    deleting_polls_left: None,
                });
            }
        }

        info!("Created {} [{}] with uid {}", request.kind, request.name, id);
        Ok(id)
    }

    async fn delete(
        &self,
        kind: EntityKind,
        name: &str,
        id: &EntityId,
        org_id: &str,
    ) -> HarnessResult<()> {
        let _guard = self.enter(Some(kind), Operation::Delete).await?;
        let key = EntityKey::new(org_id, kind, name);

        match self.entities.get(&key) {
            Some(entry) if &entry.id != id => return Err(not_found(kind, name)),
            Some(entry) if entry.deleting_polls_left.is_some() => return Ok(()),
            Some(_) => {}
            None => return Err(not_found(kind, name)),
        }

        let dependents = self.dependents_of(&key);
        if !dependents.is_empty() {
            let names: Vec<String> = dependents.iter().map(|d| d.to_string()).collect();
            return Err(HarnessError::InUse(format!(
                "{} [{}] is referenced by {}",
                kind,
                name,
                names.join(", ")
            )));
        }

        let delay = self.deletion_delay.load(Ordering::SeqCst);
        if delay == 0 {
            self.entities.remove(&key);
        } else if let Some(mut entry) = self.entities.get_mut(&key) {
            entry.status = EntityStatus::Deleting;
            entry.script.clear();
            entry.deleting_polls_left = Some(delay);
        }

        self.deletions.lock().push(EntityRef::new(kind, name));
        info!("Deleted {} [{}]", kind, name);
        Ok(())
    }

    async fn get_uid(&self, kind: EntityKind, name: &str, org_id: &str) -> HarnessResult<EntityId> {
        let _guard = self.enter(Some(kind), Operation::GetUid).await?;
        let key = EntityKey::new(org_id, kind, name);

        if !self.observe(&key) {
            return Err(not_found(kind, name));
        }
        self.entities
            .get(&key)
            .map(|entry| entry.id.clone())
            .ok_or_else(|| not_found(kind, name))
    }

    async fn status(
        &self,
        kind: EntityKind,
        name: &str,
        org_id: &str,
    ) -> HarnessResult<EntityStatus> {
        let _guard = self.enter(Some(kind), Operation::Status).await?;
        let key = EntityKey::new(org_id, kind, name);

        if !self.observe(&key) {
            return Err(not_found(kind, name));
        }
        let mut entry = self
            .entities
            .get_mut(&key)
            .ok_or_else(|| not_found(kind, name))?;
        if let Some(next) = entry.script.pop_front() {
            entry.status = next;
        }
        Ok(entry.status)
    }

    async fn enumerate(&self, kind: EntityKind, org_id: &str) -> HarnessResult<Vec<EntitySummary>> {
        let _guard = self.enter(Some(kind), Operation::Enumerate).await?;

        let keys: Vec<EntityKey> = self
            .entities
            .iter()
            .filter(|entry| entry.key().kind == kind && entry.key().org_id == org_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut summaries = Vec::with_capacity(keys.len());
        for key in keys {
            if !self.observe(&key) {
                continue;
            }
            if let Some(entry) = self.entities.get(&key) {
                summaries.push(EntitySummary {
                    kind,
                    name: key.name.clone(),
                    id: entry.id.clone(),
                    status: entry.status,
                    owner: entry.owner.clone(),
                });
            }
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn exists(&self, kind: EntityKind, name: &str, org_id: &str) -> HarnessResult<bool> {
        let _guard = self.enter(Some(kind), Operation::Enumerate).await?;
        Ok(self.observe(&EntityKey::new(org_id, kind, name)))
    }
}
