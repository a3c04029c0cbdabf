//! Optimistic concurrency token for per-resource ledger streams.

use crate::error::{StockError, StockResult};

/// Expectation about a resource stream's revision at commit time.
///
/// Every mutation of a resource's ledger bumps its revision, so a commit
/// carrying `Exact(n)` fails if any other writer slipped in after the
/// caller read revision `n`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedRevision {
    /// Skip the check (single-writer callers, backfills).
    Any,
    /// Require the stream to be at an exact revision.
    Exact(u64),
}

impl ExpectedRevision {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedRevision::Any => true,
            ExpectedRevision::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> StockResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(StockError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
