//! Behavior under injected control plane faults, cancellation and RBAC users

mod common;

use common::{harness, ORG};
use pxb_common::PollConfig;
use pxb_driver::Operation;
use pxb_poller::retry_with_timeout;
use pxb_tests::{CloudSettings, EntityKind, EntityStatus, HarnessError};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn test_create_failures_are_isolated() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);
    let cp = control_plane.clone();

    let report = context
        .run_case("flaky-create", |scope| async move {
            let settings = CloudSettings::create(&scope, "aws").await?;
            cp.inject_failure(
                Some(EntityKind::Backup),
                Operation::Create,
                HarnessError::ControlPlane("503 Service Unavailable".to_string()),
                3,
            );

            let requests = (0..10)
                .map(|i| settings.backup_request(&scope, format!("bkp-{}", i)))
                .collect();
            let batch = scope.create_batch(requests).await;

            assert_eq!(batch.len(), 10);
            assert_eq!(batch.failures().len(), 3);
            assert_eq!(batch.successes().count(), 7);
            assert_eq!(scope.registry().items_of(EntityKind::Backup).len(), 7);
            batch.into_result()
        })
        .await;

    assert!(matches!(
        report.result,
        Err(HarnessError::BatchFailed {
            failed: 3,
            total: 10,
            ..
        })
    ));
    assert!(report.cleanup.is_clean());
    assert_eq!(control_plane.count(EntityKind::Backup), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_batch_admission() -> anyhow::Result<()> {
    let (context, control_plane) = harness(2);
    let cp = control_plane.clone();

    let report = context
        .run_case("cancelled-batch", |scope| async move {
            let settings = CloudSettings::create(&scope, "aws").await?;
            cp.set_latency(Duration::from_millis(100));

            let token = scope.cancel_token().clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(150)).await;
                token.cancel("source namespace was deleted");
            });

            let requests = (0..10)
                .map(|i| settings.backup_request(&scope, format!("bkp-{}", i)))
                .collect();
            let batch = scope.create_batch(requests).await;

            let cancelled = batch
                .failures()
                .iter()
                .filter(|r| matches!(r.error(), Some(HarnessError::Cancelled(_))))
                .count();
            Ok((batch.successes().count(), cancelled))
        })
        .await;

    assert_eq!(report.result, Ok((4, 6)));
    assert!(report.cleanup.is_clean(), "{:?}", report.cleanup.failures);
    assert_eq!(report.cleanup.deleted.len(), 8);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_status_wait() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);
    control_plane.set_progression(EntityKind::Backup, vec![EntityStatus::InProgress]);

    let report = context
        .run_case("stuck-backup", |scope| async move {
            let settings = CloudSettings::create(&scope, "azure").await?;
            scope.create(settings.backup_request(&scope, "bkp-stuck")).await?;

            let sibling = scope.clone();
            tokio::spawn(async move {
                sleep(Duration::from_secs(2)).await;
                sibling.cancel("sibling validation failed");
            });

            scope.wait_for_backup_success("bkp-stuck").await
        })
        .await;

    assert!(matches!(
        report.result,
        Err(HarnessError::Cancelled(ref msg)) if msg.contains("sibling validation failed")
    ));
    assert!(report.cleanup.is_clean());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_retry_lookup_through_transient_errors() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);
    let cp = control_plane.clone();

    let report = context
        .run_case("flaky-lookup", |scope| async move {
            let settings = CloudSettings::create(&scope, "gcp").await?;
            let created = scope.create(settings.backup_request(&scope, "bkp")).await?;
            cp.inject_failure(
                Some(EntityKind::Backup),
                Operation::GetUid,
                HarnessError::ControlPlane("connection reset by peer".to_string()),
                2,
            );

            let poll = PollConfig::new(Duration::from_secs(60), Duration::from_secs(5));
            let control_plane = scope.control_plane();
            let found = retry_with_timeout(
                "backup uid",
                &poll,
                Some(scope.cancel_token()),
                || control_plane.get_uid(EntityKind::Backup, "bkp", ORG),
                |e| !e.is_not_found(),
            )
            .await?;
            Ok((created, found))
        })
        .await;

    let (created, found) = report.into_result()?;
    assert_eq!(created, found);
    Ok(())
}

#[tokio::test]
async fn test_user_entities_are_cleaned_before_admin() -> anyhow::Result<()> {
    let (context, control_plane) = harness(4);

    let report = context
        .run_case("rbac-backups", |scope| async move {
            let settings = CloudSettings::create(&scope, "aws").await?;
            let users = ["tp-user-1", "tp-user-2"];
            let requests = users
                .iter()
                .map(|user| {
                    settings
                        .backup_request(&scope, format!("{}-bkp", user))
                        .with_owner(*user)
                })
                .collect();
            scope.create_batch(requests).await.into_result()?;

            for user in users {
                let registry = scope.registry_for(user);
                assert!(registry.contains(EntityKind::Backup, &format!("{}-bkp", user)));
                assert_eq!(registry.owner(), Some(user));
            }
            assert!(scope.registry().items_of(EntityKind::Backup).is_empty());
            Ok(())
        })
        .await;

    assert!(report.is_success(), "{:?}", report.cleanup.failures);
    let kinds: Vec<EntityKind> = report.cleanup.deleted.iter().map(|e| e.kind).collect();
    assert_eq!(&kinds[..2], &[EntityKind::Backup, EntityKind::Backup]);
    assert_eq!(kinds.len(), 6);
    assert_eq!(control_plane.count(EntityKind::CloudCredential), 0);
    Ok(())
}
