/// Logical-name to control-plane-id bookkeeping for one test case
pub mod registry;
pub mod set;

pub use registry::EntityRegistry;
pub use set::RegistrySet;
