//! Control plane capability consumed by the harness, plus an in-memory
//! implementation the suite's own tests run against.
pub mod memory;
pub mod traits;

pub use memory::MemoryControlPlane;
pub use traits::{ControlPlane, CreateRequest, EntityRef, EntitySummary, Operation};

#[cfg(any(test, feature = "test-utils"))]
pub use traits::MockControlPlane;
