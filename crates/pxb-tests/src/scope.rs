use pxb_cleanup::{CleanupReport, CleanupSequencer};
use pxb_common::config::PollProfiles;
use pxb_common::{
    CancellationToken, EntityId, EntityKind, EntityStatus, HarnessConfig, HarnessError,
    HarnessResult, PollConfig,
};
use pxb_driver::{ControlPlane, CreateRequest};
use pxb_poller::{wait_for_absence, wait_for_status};
use pxb_registry::{EntityRegistry, RegistrySet};
use pxb_runner::{BatchReport, TaskRunner};
use std::sync::Arc;
use tracing::{debug, info};

/// Terminal statuses that mean a backup or restore will never succeed
const FAILED_STATUSES: &[EntityStatus] = &[
    EntityStatus::Invalid,
    EntityStatus::Aborted,
    EntityStatus::Failed,
];

/// Per-case handle: registries, runner, poll profiles and a cancellation
/// token shared by every task the case starts.
#[derive(Clone)]
pub struct CaseScope {
    name: String,
    org_id: String,
    control_plane: Arc<dyn ControlPlane>,
    registries: Arc<RegistrySet>,
    runner: TaskRunner,
    profiles: PollProfiles,
    sequencer: Arc<CleanupSequencer>,
    cancel: CancellationToken,
}

impl CaseScope {
    pub(crate) fn new(
        name: &str,
        config: &HarnessConfig,
        control_plane: Arc<dyn ControlPlane>,
        sequencer: Arc<CleanupSequencer>,
    ) -> Self {
        Self {
            name: name.to_string(),
            org_id: config.control_plane.org_id.clone(),
            control_plane,
            registries: Arc::new(RegistrySet::new(config.control_plane.admin_user.clone())),
            runner: TaskRunner::from_config(&config.runner),
            profiles: config.poll.clone(),
            sequencer,
            cancel: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn control_plane(&self) -> &dyn ControlPlane {
        self.control_plane.as_ref()
    }

    pub fn profiles(&self) -> &PollProfiles {
        &self.profiles
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn sequencer(&self) -> &CleanupSequencer {
        &self.sequencer
    }

    /// Admin registry
    pub fn registry(&self) -> Arc<EntityRegistry> {
        self.registries.admin()
    }

    pub fn registry_for(&self, user: &str) -> Arc<EntityRegistry> {
        self.registries.for_user(user)
    }

    pub fn registries(&self) -> &RegistrySet {
        &self.registries
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop every poll and batch admission in this case
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.cancel.cancel(reason)
    }

    /// Creation request in this case's organization
    pub fn request(&self, kind: EntityKind, name: impl Into<String>) -> CreateRequest {
        CreateRequest::new(kind, name, self.org_id.clone())
    }

    /// Create an entity and register it under its owner
    pub async fn create(&self, request: CreateRequest) -> HarnessResult<EntityId> {
        self.ensure_active()?;
        create_and_register(self.control_plane.as_ref(), &self.registries, request).await
    }

    /// Create a batch with bounded concurrency.
    ///
    /// Every successful creation is registered before this returns, so
    /// callers may read ids for the whole batch right after it.
    pub async fn create_batch(&self, requests: Vec<CreateRequest>) -> BatchReport<EntityId> {
        let control_plane = self.control_plane.clone();
        let registries = self.registries.clone();

        self.runner
            .run_each(requests, Some(&self.cancel), move |_, request| {
                let control_plane = control_plane.clone();
                let registries = registries.clone();
                async move { create_and_register(control_plane.as_ref(), &registries, request).await }
            })
            .await
    }

    /// Id of a registered entity, from any user's registry
    pub fn lookup(&self, kind: EntityKind, name: &str) -> Option<EntityId> {
        self.registries
            .teardown_order()
            .iter()
            .find_map(|registry| registry.get(kind, name))
    }

    /// Poll an entity's status until it is in `expected`
    pub async fn wait_for_status(
        &self,
        kind: EntityKind,
        name: &str,
        config: &PollConfig,
        expected: &[EntityStatus],
        unexpected: &[EntityStatus],
    ) -> HarnessResult<EntityStatus> {
        let what = format!("{} [{}]", kind, name);
        let control_plane = self.control_plane.as_ref();
        let org = self.org_id.as_str();

        wait_for_status(&what, config, Some(&self.cancel), expected, unexpected, move || {
            control_plane.status(kind, name, org)
        })
        .await
    }

    pub async fn wait_for_backup_success(&self, name: &str) -> HarnessResult<EntityStatus> {
        let config = self.profiles.backup_completion;
        let status = self
            .wait_for_status(
                EntityKind::Backup,
                name,
                &config,
                &[EntityStatus::Success],
                FAILED_STATUSES,
            )
            .await?;
        info!("Backup [{}] completed with {}", name, status);
        Ok(status)
    }

    /// Success or partial success both count for a restore
    pub async fn wait_for_restore_success(&self, name: &str) -> HarnessResult<EntityStatus> {
        let config = self.profiles.restore_completion;
        let status = self
            .wait_for_status(
                EntityKind::Restore,
                name,
                &config,
                &[EntityStatus::Success, EntityStatus::PartialSuccess],
                FAILED_STATUSES,
            )
            .await?;
        info!("Restore [{}] completed with {}", name, status);
        Ok(status)
    }

    /// Delete an entity and wait until the control plane no longer lists it
    pub async fn delete_and_wait(&self, kind: EntityKind, name: &str) -> HarnessResult<()> {
        self.ensure_active()?;
        let org = self.org_id.as_str();
        let control_plane = self.control_plane.as_ref();

        let id = match self.lookup(kind, name) {
            Some(id) => id,
            None => control_plane.get_uid(kind, name, org).await?,
        };
        control_plane.delete(kind, name, &id, org).await?;

        let what = format!("{} [{}]", kind, name);
        let config = self.profiles.deletion(kind);
        wait_for_absence(&what, &config, Some(&self.cancel), move || {
            control_plane.exists(kind, name, org)
        })
        .await?;

        for registry in self.registries.teardown_order() {
            registry.delete(kind, name);
        }
        debug!("{} deleted", what);
        Ok(())
    }

    /// Tear down everything this case registered
    pub async fn cleanup(&self) -> CleanupReport {
        self.sequencer.run_set(&self.registries).await
    }

    fn ensure_active(&self) -> HarnessResult<()> {
        if self.cancel.is_cancelled() {
            return Err(HarnessError::Cancelled(format!(
                "case {}: {}",
                self.name,
                self.cancel.reason().unwrap_or_default()
            )));
        }
        Ok(())
    }
}

async fn create_and_register(
    control_plane: &dyn ControlPlane,
    registries: &RegistrySet,
    request: CreateRequest,
) -> HarnessResult<EntityId> {
    let kind = request.kind;
    let name = request.name.clone();
    let registry = match &request.owner {
        Some(owner) => registries.for_user(owner),
        None => registries.admin(),
    };

    let id = control_plane.create(request).await?;
    registry.put(kind, name, id.clone());
    Ok(id)
}
