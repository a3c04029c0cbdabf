//! `stocklot-core` — foundation building blocks for the stock ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the shared error taxonomy, and the optimistic
//! concurrency token used by the ledger store.

pub mod error;
pub mod id;
pub mod revision;

pub use error::{StockError, StockResult};
pub use id::{CompositeId, EntryId, LineId, ResourceId};
pub use revision::ExpectedRevision;
