//! Versioned documents and optimistic concurrency.

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};

/// A persisted document with a monotonically increasing revision.
///
/// Stores bump the revision on every successful write and use it to detect
/// concurrent modification between read and commit.
pub trait Document: Entity {
    /// Stable collection name (e.g. "catalog.product").
    fn collection() -> &'static str;

    /// Revision of the document as last read from the store (0 = never stored).
    fn version(&self) -> u64;

    /// Stamp the revision assigned by the store on write.
    fn set_version(&mut self, version: u64);
}

/// Optimistic concurrency expectation for a document write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (inserts of brand-new documents).
    Any,
    /// Require the stored document to be at an exact revision.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
