use pxb_common::logging::init_test_tracing;
use pxb_common::PollConfig;
use pxb_tests::{HarnessConfig, HarnessContext, MemoryControlPlane};
use std::sync::Arc;
use std::time::Duration;

pub const ORG: &str = "default";

/// Poll profile short enough for tests that run on the real clock
pub fn fast_poll() -> PollConfig {
    PollConfig::new(Duration::from_secs(5), Duration::from_millis(10))
}

pub fn test_config(max_concurrency: usize) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.runner.max_concurrency = max_concurrency;
    config.poll.default = fast_poll();
    config.poll.backup_completion = fast_poll();
    config.poll.restore_completion = fast_poll();
    config.poll.backup_delete = fast_poll();
    config.poll.backup_location_delete = fast_poll();
    config.poll.cloud_credential_delete = fast_poll();
    config.poll.cluster_delete = fast_poll();
    config
}

/// Suite context over a fresh in-memory control plane
pub fn harness(max_concurrency: usize) -> (HarnessContext, Arc<MemoryControlPlane>) {
    init_test_tracing();
    let control_plane = MemoryControlPlane::shared();
    let context = HarnessContext::new(test_config(max_concurrency), control_plane.clone())
        .expect("test configuration is valid");
    (context, control_plane)
}
