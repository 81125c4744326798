//! Suite context and scenario workflows for the Px-Backup integration tests.
//!
//! A [`HarnessContext`] is built once per suite run and hands every test case
//! its own [`CaseScope`]; cleanup of whatever the case created runs when the
//! case ends, whether it passed, failed or panicked.

pub mod context;
pub mod scope;
pub mod workflows;

pub use context::{CaseReport, HarnessContext};
pub use scope::CaseScope;
pub use workflows::CloudSettings;

pub use pxb_cleanup::CleanupReport;
pub use pxb_common::{EntityId, EntityKind, EntityStatus, HarnessConfig, HarnessError, HarnessResult};
pub use pxb_driver::{ControlPlane, CreateRequest, MemoryControlPlane};
