use pxb_common::config::{CleanupConfig, PollProfiles};
use pxb_common::{EntityId, EntityKind, EntityRecord, HarnessConfig, HarnessResult, PollConfig};
use pxb_driver::{ControlPlane, EntityRef, EntitySummary};
use pxb_poller::wait_for_absence;
use pxb_registry::{EntityRegistry, RegistrySet};
use pxb_runner::TaskRunner;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::order::teardown_order;
use crate::report::{CleanupFailure, CleanupReport};

/// How a single delete ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Deleted,
    AlreadyClean,
}

/// Tears down registered entities in dependency order.
///
/// Kinds are processed one after another; entities of one kind are deleted
/// concurrently. Failures are recorded and never stop the remaining steps.
/// An entity that is already gone counts as clean.
pub struct CleanupSequencer {
    control_plane: Arc<dyn ControlPlane>,
    org_id: String,
    config: CleanupConfig,
    profiles: PollProfiles,
    order: Vec<EntityKind>,
}

impl CleanupSequencer {
    pub fn new(control_plane: Arc<dyn ControlPlane>, org_id: impl Into<String>) -> HarnessResult<Self> {
        Ok(Self {
            control_plane,
            org_id: org_id.into(),
            config: CleanupConfig::default(),
            profiles: PollProfiles::default(),
            order: teardown_order()?,
        })
    }

    pub fn from_config(control_plane: Arc<dyn ControlPlane>, config: &HarnessConfig) -> HarnessResult<Self> {
        Ok(Self::new(control_plane, config.control_plane.org_id.clone())?
            .with_cleanup_config(config.cleanup.clone())
            .with_poll_profiles(config.poll.clone()))
    }

    pub fn with_cleanup_config(mut self, config: CleanupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_poll_profiles(mut self, profiles: PollProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn order(&self) -> &[EntityKind] {
        &self.order
    }

    /// Delete everything in `registry`.
    ///
    /// Entries are removed from the registry once their remote deletion is
    /// confirmed; failed entries stay so a later pass can retry them.
    #[instrument(skip_all, fields(org = %self.org_id, entities = registry.len()))]
    pub async fn run(&self, registry: &EntityRegistry) -> CleanupReport {
        self.run_registries(&[registry]).await
    }

    /// Clean every user's registry in one dependency-ordered pass.
    ///
    /// Each kind is removed from all users before the next kind starts, so an
    /// entity owned by one user never outlives its dependents owned by another.
    /// Within a kind, non-admin users' entities are submitted first.
    #[instrument(skip_all, fields(org = %self.org_id, users = registries.users().len()))]
    pub async fn run_set(&self, registries: &RegistrySet) -> CleanupReport {
        let ordered = registries.teardown_order();
        let refs: Vec<&EntityRegistry> = ordered.iter().map(|r| r.as_ref()).collect();
        self.run_registries(&refs).await
    }

    async fn run_registries(&self, registries: &[&EntityRegistry]) -> CleanupReport {
        let mut report = CleanupReport::default();

        for kind in &self.order {
            let owned: Vec<(usize, EntityRecord)> = registries
                .iter()
                .enumerate()
                .flat_map(|(slot, registry)| {
                    registry
                        .items_of(*kind)
                        .into_iter()
                        .map(move |record| (slot, record))
                })
                .collect();
            if owned.is_empty() {
                continue;
            }
            info!("Cleaning up {} {} entities", owned.len(), kind);

            let (slots, records): (Vec<usize>, Vec<EntityRecord>) = owned.into_iter().unzip();
            let names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
            let outcomes = self.delete_batch(*kind, records).await;

            for ((slot, name), outcome) in slots
                .into_iter()
                .zip(names)
                .zip(outcomes.into_reports())
            {
                match outcome.result {
                    Ok(disposition) => {
                        registries[slot].delete(*kind, &name);
                        let entity = EntityRef::new(*kind, name);
                        match disposition {
                            Disposition::Deleted => report.deleted.push(entity),
                            Disposition::AlreadyClean => report.already_clean.push(entity),
                        }
                    }
                    Err(error) => {
                        warn!("Failed to clean up {} [{}]: {}", kind, name, error);
                        report.failures.push(CleanupFailure {
                            kind: *kind,
                            name: Some(name),
                            error,
                        });
                    }
                }
            }
        }

        if report.is_clean() {
            info!("Cleanup finished: {}", report);
        } else {
            warn!("Cleanup finished with failures: {}", report);
        }
        report
    }

    /// Delete backup locations, their cloud credential and the named clusters
    pub async fn cleanup_cloud_settings_and_clusters(
        &self,
        locations: &HashMap<EntityId, String>,
        credential_name: &str,
        credential_id: &EntityId,
        clusters: &[&str],
    ) -> CleanupReport {
        info!(
            "Cleaning backup locations {:?}, cloud credential [{}] and clusters {:?}",
            locations.values().collect::<Vec<_>>(),
            credential_name,
            clusters
        );
        let registry = EntityRegistry::new();
        let mut report = CleanupReport::default();

        for (id, name) in locations {
            registry.insert(EntityRecord::new(EntityKind::BackupLocation, name, id.clone()));
        }
        if !locations.is_empty() {
            registry.insert(EntityRecord::new(
                EntityKind::CloudCredential,
                credential_name,
                credential_id.clone(),
            ));
        }

        for cluster in clusters {
            match self
                .control_plane
                .get_uid(EntityKind::Cluster, cluster, &self.org_id)
                .await
            {
                Ok(id) => {
                    registry.insert(EntityRecord::new(EntityKind::Cluster, *cluster, id));
                }
                Err(e) if e.is_not_found() => {
                    report
                        .already_clean
                        .push(EntityRef::new(EntityKind::Cluster, *cluster));
                }
                Err(error) => {
                    warn!("Failed to look up cluster [{}]: {}", cluster, error);
                    report.failures.push(CleanupFailure {
                        kind: EntityKind::Cluster,
                        name: Some(cluster.to_string()),
                        error,
                    });
                }
            }
        }

        report.merge(self.run(&registry).await);
        report
    }

    /// Delete every entity in the organization that `filter` accepts
    #[instrument(skip_all, fields(org = %self.org_id))]
    pub async fn sweep<F>(&self, filter: F) -> CleanupReport
    where
        F: Fn(&EntitySummary) -> bool,
    {
        let registry = EntityRegistry::new();
        let mut report = CleanupReport::default();

        for kind in &self.order {
            match self.control_plane.enumerate(*kind, &self.org_id).await {
                Ok(summaries) => {
                    for summary in summaries.iter().filter(|s| filter(s)) {
                        debug!("Sweeping {} [{}]", kind, summary.name);
                        let mut record =
                            EntityRecord::new(*kind, summary.name.clone(), summary.id.clone());
                        record.owner = summary.owner.clone();
                        registry.insert(record);
                    }
                }
                Err(error) => {
                    warn!("Failed to enumerate {}: {}", kind, error);
                    report.failures.push(CleanupFailure {
                        kind: *kind,
                        name: None,
                        error,
                    });
                }
            }
        }

        report.merge(self.run(&registry).await);
        report
    }

    async fn delete_batch(
        &self,
        kind: EntityKind,
        records: Vec<EntityRecord>,
    ) -> pxb_runner::BatchReport<Disposition> {
        let control_plane = self.control_plane.clone();
        let org_id = self.org_id.clone();
        let wait = self
            .config
            .wait_for_deletion
            .then(|| self.profiles.deletion(kind));

        TaskRunner::new(self.config.delete_concurrency)
            .run_each(records, None, move |_, record| {
                let control_plane = control_plane.clone();
                let org_id = org_id.clone();
                async move { delete_entity(control_plane, org_id, record, wait).await }
            })
            .await
    }
}

async fn delete_entity(
    control_plane: Arc<dyn ControlPlane>,
    org_id: String,
    record: EntityRecord,
    wait: Option<PollConfig>,
) -> HarnessResult<Disposition> {
    let kind = record.kind;
    let name = record.name.as_str();
    let org = org_id.as_str();

    match control_plane.delete(kind, name, &record.id, org).await {
        Ok(()) => debug!("Delete requested for {} [{}]", kind, name),
        Err(e) if e.is_not_found() => {
            debug!("{} [{}] already deleted", kind, name);
            return Ok(Disposition::AlreadyClean);
        }
        Err(e) => return Err(e),
    }

    if let Some(poll) = wait {
        let what = format!("{} [{}]", kind, name);
        let control_plane = control_plane.as_ref();
        wait_for_absence(&what, &poll, None, move || control_plane.exists(kind, name, org)).await?;
    }

    Ok(Disposition::Deleted)
}
