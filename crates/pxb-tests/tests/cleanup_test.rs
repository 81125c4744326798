//! Case teardown: unconditional, ordered, idempotent and soft on failure

mod common;

use common::{harness, ORG};
use futures::FutureExt;
use pxb_driver::{EntityRef, Operation};
use pxb_tests::{CloudSettings, EntityKind, EntityStatus, HarnessError};
use std::panic::AssertUnwindSafe;

#[tokio::test]
async fn test_cleanup_runs_after_failed_body() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);

    let report = context
        .run_case("failing-body", |scope| async move {
            let settings = CloudSettings::create(&scope, "aws").await?;
            let requests = (0..3)
                .map(|i| settings.backup_request(&scope, format!("bkp-{}", i)))
                .collect();
            scope.create_batch(requests).await.into_result()?;

            Err::<(), _>(HarnessError::Fatal(
                "restored data does not match backup".to_string(),
            ))
        })
        .await;

    assert!(matches!(report.result, Err(HarnessError::Fatal(_))));
    assert!(report.cleanup.is_clean());
    assert_eq!(report.cleanup.deleted.len(), 7);
    for kind in EntityKind::ALL {
        assert_eq!(control_plane.count(kind), 0);
    }
    Ok(())
}

#[tokio::test]
async fn test_cleanup_runs_before_panic_resumes() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);

    let outcome = AssertUnwindSafe(context.run_case("panicking-body", |scope| async move {
        let settings = CloudSettings::create(&scope, "azure").await?;
        scope.create(settings.backup_request(&scope, "bkp")).await?;
        if scope.lookup(EntityKind::Backup, "bkp").is_some() {
            panic!("validation goroutine crashed");
        }
        Ok(())
    }))
    .catch_unwind()
    .await;

    let panic = outcome.expect_err("the body's panic is resumed");
    assert_eq!(
        panic.downcast_ref::<&str>(),
        Some(&"validation goroutine crashed")
    );
    for kind in EntityKind::ALL {
        assert_eq!(control_plane.count(kind), 0);
    }
    Ok(())
}

#[tokio::test]
async fn test_entities_deleted_elsewhere_are_already_clean() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);
    let cp = control_plane.clone();

    let report = context
        .run_case("deleted-elsewhere", |scope| async move {
            let settings = CloudSettings::create(&scope, "gcp").await?;
            scope.create(settings.backup_request(&scope, "bkp")).await?;
            scope
                .create(settings.restore_request(&scope, "restore", "bkp"))
                .await?;

            // The restore CR was killed outside the harness
            assert!(cp.remove_out_of_band(ORG, EntityKind::Restore, "restore"));
            Ok(())
        })
        .await;

    assert!(report.is_success());
    assert_eq!(
        report.cleanup.already_clean,
        vec![EntityRef::new(EntityKind::Restore, "restore")]
    );
    assert_eq!(report.cleanup.deleted.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_second_cleanup_has_no_side_effects() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);
    let scope = context.scope("double-cleanup");
    let settings = CloudSettings::create(&scope, "aws").await?;
    scope
        .create_batch(vec![
            settings.backup_request(&scope, "bkp-a"),
            settings.backup_request(&scope, "bkp-b"),
        ])
        .await
        .into_result()?;
    let records = scope.registry().items();

    let first = scope.cleanup().await;
    assert!(first.is_clean());
    assert_eq!(first.deleted.len(), 6);
    let deletions = control_plane.deletions();

    // Re-register the same entities and clean again
    for record in records {
        scope.registry().insert(record);
    }
    let second = scope.cleanup().await;

    assert!(second.is_clean());
    assert!(second.deleted.is_empty());
    assert_eq!(second.already_clean.len(), 6);
    assert_eq!(control_plane.deletions(), deletions);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deleted_bucket_leaves_cloud_backup_missing() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);
    let cp = control_plane.clone();

    let report = context
        .run_case("bucket-deleted", |scope| async move {
            let settings = CloudSettings::create(&scope, "aws").await?;
            scope.create(settings.backup_request(&scope, "bkp")).await?;
            scope.wait_for_backup_success("bkp").await?;

            cp.remove_out_of_band(ORG, EntityKind::BackupLocation, &settings.location_name);

            let poll = scope.profiles().default;
            scope
                .wait_for_status(
                    EntityKind::Backup,
                    "bkp",
                    &poll,
                    &[EntityStatus::CloudBackupMissing],
                    &[],
                )
                .await?;
            Ok(settings.location_name)
        })
        .await;

    assert!(report.cleanup.is_clean(), "{:?}", report.cleanup.failures);
    let location = report.result?;
    assert_eq!(
        report.cleanup.already_clean,
        vec![EntityRef::new(EntityKind::BackupLocation, location)]
    );
    Ok(())
}

#[tokio::test]
async fn test_cleanup_cloud_settings_and_clusters() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);

    let report = context
        .run_case("cloud-settings-helper", |scope| async move {
            let settings = CloudSettings::create(&scope, "nfs").await?;
            let cleanup = settings.cleanup(&scope).await;
            assert!(cleanup.is_clean(), "{:?}", cleanup.failures);
            Ok(cleanup.deleted)
        })
        .await;

    assert!(report.cleanup.is_clean());
    assert_eq!(report.cleanup.already_clean.len(), 4);
    let deleted: Vec<EntityKind> = report.into_result()?.iter().map(|e| e.kind).collect();
    assert_eq!(
        deleted,
        vec![
            EntityKind::Cluster,
            EntityKind::Cluster,
            EntityKind::BackupLocation,
            EntityKind::CloudCredential
        ]
    );
    assert_eq!(control_plane.count(EntityKind::Cluster), 0);
    Ok(())
}

#[tokio::test]
async fn test_cleanup_failure_is_soft() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);
    control_plane.inject_persistent_failure(
        Some(EntityKind::BackupLocation),
        Operation::Delete,
        HarnessError::ControlPlane("bucket is locked".to_string()),
    );

    let report = context
        .run_case("locked-bucket", |scope| async move {
            CloudSettings::create(&scope, "aws").await?;
            Ok(())
        })
        .await;

    assert!(report.result.is_ok());
    assert!(!report.is_success());
    let failed: Vec<EntityKind> = report.cleanup.failures.iter().map(|f| f.kind).collect();
    assert_eq!(failed, vec![EntityKind::BackupLocation, EntityKind::CloudCredential]);
    assert_eq!(control_plane.count(EntityKind::Cluster), 0);

    // A sweep picks up what the case left behind
    control_plane.clear_faults();
    let sweep = context.sequencer().sweep(|_| true).await;
    assert!(sweep.is_clean());
    assert_eq!(sweep.deleted.len(), 2);
    Ok(())
}
