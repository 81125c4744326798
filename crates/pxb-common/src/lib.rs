/// Shared types for the Px-Backup integration harness
pub mod cancellation;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;

pub use cancellation::CancellationToken;
pub use config::{ExecutionMode, HarnessConfig, PollConfig};
pub use error::{HarnessError, HarnessResult};
pub use models::{EntityId, EntityKind, EntityRecord, EntityStatus};
