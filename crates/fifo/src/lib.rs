//! stocklot-fifo: first-in-first-out consumption over the stock ledger.
//!
//! [`FifoEngine`] plans consumptions against the oldest lots first and
//! commits them as one atomic, revision-checked batch through a
//! [`stocklot_ledger::LedgerStore`]. Lost races are retried under a bounded
//! [`RetryPolicy`]. The engine also prices resources at the weighted-average
//! cost of their stock on hand, which plugs it into BOM cost rollups as a
//! `CostOracle`.

pub mod engine;
pub mod retry;


pub use engine::{AvailableLot, FifoEngine, LotAllocation};
pub use retry::{RetryPolicy, with_conflict_retry};
