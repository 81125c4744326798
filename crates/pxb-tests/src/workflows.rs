use pxb_cleanup::CleanupReport;
use pxb_common::models::unique_name;
use pxb_common::{EntityId, EntityKind, HarnessResult};
use pxb_driver::CreateRequest;
use std::collections::HashMap;
use tracing::info;

use crate::scope::CaseScope;

/// Credential, backup location and clusters most backup cases start from
#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub credential_name: String,
    pub credential_id: EntityId,
    pub location_name: String,
    pub location_id: EntityId,
    pub source_cluster: String,
    pub destination_cluster: String,
}

impl CloudSettings {
    /// Create and register the credential, one backup location and the
    /// source and destination clusters.
    pub async fn create(scope: &CaseScope, provider: &str) -> HarnessResult<Self> {
        let credential_name = unique_name(&format!("{}-cred", provider));
        let location_name = unique_name(&format!("{}-bl", provider));
        let source_cluster = unique_name("source");
        let destination_cluster = unique_name("destination");

        // The credential uid is chosen by the caller
        let credential_id = scope
            .create(
                scope
                    .request(EntityKind::CloudCredential, &credential_name)
                    .with_uid(EntityId::generate()),
            )
            .await?;
        let location_id = scope
            .create(
                scope
                    .request(EntityKind::BackupLocation, &location_name)
                    .with_parent(EntityKind::CloudCredential, &credential_name),
            )
            .await?;
        for cluster in [&source_cluster, &destination_cluster] {
            scope
                .create(
                    scope
                        .request(EntityKind::Cluster, cluster)
                        .with_parent(EntityKind::CloudCredential, &credential_name),
                )
                .await?;
        }

        info!(
            "Cloud settings ready: credential [{}], location [{}], clusters [{}] and [{}]",
            credential_name, location_name, source_cluster, destination_cluster
        );
        Ok(Self {
            credential_name,
            credential_id,
            location_name,
            location_id,
            source_cluster,
            destination_cluster,
        })
    }

    /// Backup of the source cluster into this location
    pub fn backup_request(&self, scope: &CaseScope, name: impl Into<String>) -> CreateRequest {
        scope
            .request(EntityKind::Backup, name)
            .with_parent(EntityKind::BackupLocation, &self.location_name)
            .with_parent(EntityKind::Cluster, &self.source_cluster)
    }

    /// Restore of `backup` onto the destination cluster
    pub fn restore_request(
        &self,
        scope: &CaseScope,
        name: impl Into<String>,
        backup: &str,
    ) -> CreateRequest {
        scope
            .request(EntityKind::Restore, name)
            .with_parent(EntityKind::Backup, backup)
            .with_parent(EntityKind::Cluster, &self.destination_cluster)
    }

    pub fn locations(&self) -> HashMap<EntityId, String> {
        HashMap::from([(self.location_id.clone(), self.location_name.clone())])
    }

    /// Delete the location, credential and both clusters right away
    pub async fn cleanup(&self, scope: &CaseScope) -> CleanupReport {
        scope
            .sequencer()
            .cleanup_cloud_settings_and_clusters(
                &self.locations(),
                &self.credential_name,
                &self.credential_id,
                &[self.source_cluster.as_str(), self.destination_cluster.as_str()],
            )
            .await
    }
}
