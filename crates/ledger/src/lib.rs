//! `stocklot-ledger` — append-only, lot-tracked stock ledger.
//!
//! This crate holds the entry model and the persistence boundary: pure data
//! access with referential validity checks, no consumption policy. FIFO
//! lives in `stocklot-fifo`, on top of the `LedgerStore` trait.

pub mod entry;
pub mod in_memory;
pub mod store;

pub use entry::{EntryKind, LedgerEntry, LotMetadata, SourceRef};
pub use in_memory::InMemoryLedgerStore;
pub use store::{ConsumptionDraft, LedgerStore};
