use pxb_common::{EntityKind, HarnessError};
use pxb_driver::EntityRef;
use std::fmt;

/// A teardown step that did not succeed
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupFailure {
    pub kind: EntityKind,

    /// `None` when the failure was enumerating the kind
    pub name: Option<String>,

    pub error: HarnessError,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} [{}]: {}", self.kind, name, self.error),
            None => write!(f, "{} (enumerate): {}", self.kind, self.error),
        }
    }
}

/// What a cleanup pass did, in teardown order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub deleted: Vec<EntityRef>,

    /// Entities already gone when cleanup reached them
    pub already_clean: Vec<EntityRef>,

    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: CleanupReport) {
        self.deleted.extend(other.deleted);
        self.already_clean.extend(other.already_clean);
        self.failures.extend(other.failures);
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} deleted, {} already clean, {} failed",
            self.deleted.len(),
            self.already_clean.len(),
            self.failures.len()
        )
    }
}
