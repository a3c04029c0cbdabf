//! Error model shared by the ledger, consumption, and catalog components.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::CompositeId;

/// Result type used across the stock core.
pub type StockResult<T> = Result<T, StockError>;

/// Errors surfaced by stock operations.
///
/// Business outcomes (validation, insufficient stock, circular references)
/// are deterministic and never retried. `Conflict` is transient and retried
/// internally; `Storage` is what remains once retries are exhausted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Input failed validation (e.g. non-positive quantity, malformed id).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced resource, lot, composite, or line does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Requested consumption exceeds what is available across all lots.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    /// The edge being added would make a composite require itself.
    #[error("circular reference: {}", render_cycle(path))]
    CircularReference { path: Vec<CompositeId> },

    /// Optimistic concurrency conflict (stale revision).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A write that would corrupt ledger integrity (e.g. overdraw one lot).
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Storage failure, surfaced only after retries are exhausted.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn insufficient(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn cycle(path: Vec<CompositeId>) -> Self {
        Self::CircularReference { path }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether the error is a transient conflict worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

fn render_cycle(path: &[CompositeId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
