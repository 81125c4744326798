use futures::FutureExt;
use pxb_cleanup::{CleanupReport, CleanupSequencer};
use pxb_common::{HarnessConfig, HarnessResult};
use pxb_driver::ControlPlane;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::scope::CaseScope;

/// Outcome of one test case and of the cleanup that followed it
#[derive(Debug)]
pub struct CaseReport<T> {
    pub name: String,
    pub result: HarnessResult<T>,
    pub cleanup: CleanupReport,
}

impl<T> CaseReport<T> {
    /// The body passed and left nothing behind
    pub fn is_success(&self) -> bool {
        self.result.is_ok() && self.cleanup.is_clean()
    }

    /// The body's result; cleanup failures are soft and not reflected here
    pub fn into_result(self) -> HarnessResult<T> {
        self.result
    }
}

/// Everything a suite run shares, constructed once and passed explicitly
pub struct HarnessContext {
    config: HarnessConfig,
    control_plane: Arc<dyn ControlPlane>,
    sequencer: Arc<CleanupSequencer>,
}

impl HarnessContext {
    pub fn new(config: HarnessConfig, control_plane: Arc<dyn ControlPlane>) -> HarnessResult<Self> {
        config.validate()?;
        let sequencer = Arc::new(CleanupSequencer::from_config(control_plane.clone(), &config)?);

        info!(
            "Harness ready for org {} (max concurrency {})",
            config.control_plane.org_id, config.runner.max_concurrency
        );
        Ok(Self {
            config,
            control_plane,
            sequencer,
        })
    }

    /// Build from defaults plus `PXB_*` environment overrides
    pub fn from_env(control_plane: Arc<dyn ControlPlane>) -> HarnessResult<Self> {
        Self::new(HarnessConfig::from_env()?, control_plane)
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn org_id(&self) -> &str {
        &self.config.control_plane.org_id
    }

    pub fn control_plane(&self) -> Arc<dyn ControlPlane> {
        self.control_plane.clone()
    }

    pub fn sequencer(&self) -> Arc<CleanupSequencer> {
        self.sequencer.clone()
    }

    /// Fresh scope with its own registries and cancellation token
    pub fn scope(&self, name: &str) -> CaseScope {
        CaseScope::new(name, &self.config, self.control_plane.clone(), self.sequencer.clone())
    }

    /// Run `body` in a fresh scope, then clean up unconditionally.
    ///
    /// A panic in the body is resumed once cleanup has finished.
    #[instrument(skip(self, body))]
    pub async fn run_case<T, F, Fut>(&self, name: &str, body: F) -> CaseReport<T>
    where
        F: FnOnce(CaseScope) -> Fut,
        Fut: Future<Output = HarnessResult<T>>,
    {
        let scope = self.scope(name);
        info!("Starting case {}", name);

        let case = scope.clone();
        let outcome = AssertUnwindSafe(async move { body(case).await })
            .catch_unwind()
            .await;

        scope.cancel(format!("case {} finished", name));
        let cleanup = scope.cleanup().await;

        match outcome {
            Ok(result) => {
                match &result {
                    Ok(_) => info!("Case {} passed; cleanup: {}", name, cleanup),
                    Err(e) => warn!("Case {} failed: {}; cleanup: {}", name, e, cleanup),
                }
                CaseReport {
                    name: name.to_string(),
                    result,
                    cleanup,
                }
            }
            Err(panic) => {
                error!("Case {} panicked; cleanup: {}", name, cleanup);
                std::panic::resume_unwind(panic)
            }
        }
    }
}
