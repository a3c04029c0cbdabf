//! Ledger entry model: lots and the consumptions drawn from them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stocklot_core::{EntryId, ResourceId};

/// What a ledger entry represents.
///
/// The ledger is an immutable event log. A `Lot` is an inbound batch with its
/// own quantity and cost basis; a `Consumption` decrements exactly one lot,
/// referenced by `lot_id`. This is the tagged form of the nullable
/// parent-entry link: lots have no parent, consumptions have exactly one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Lot,
    Consumption { lot_id: EntryId },
}

/// External event that caused a ledger entry, carried for audit only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceRef {
    Receipt(Uuid),
    ProductionRun(Uuid),
    Sale(Uuid),
    Scrap(Uuid),
}

/// Optional fields accepted when creating a lot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotMetadata {
    /// Business timestamp of the lot; defaults to the current time.
    ///
    /// FIFO ordering follows this value. Prefer passing it explicitly in
    /// tests for determinism.
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch_label: Option<String>,
    pub source: Option<SourceRef>,
}

/// One row of the stock ledger.
///
/// Rows are immutable once created except for the `active` flag (soft
/// delete/reversal). Quantities are signed: positive for lots, negative for
/// consumptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub resource_id: ResourceId,
    pub kind: EntryKind,
    pub quantity: Decimal,
    /// Total cost attributed to the entry at creation time (not per-unit).
    /// Zero for consumption entries.
    pub cost_basis: Decimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch_label: Option<String>,
    pub active: bool,
    pub source: Option<SourceRef>,
}

impl LedgerEntry {
    pub fn is_lot(&self) -> bool {
        matches!(self.kind, EntryKind::Lot)
    }

    /// Parent lot for consumption entries; `None` means the entry is a lot.
    pub fn parent_entry_id(&self) -> Option<EntryId> {
        match self.kind {
            EntryKind::Lot => None,
            EntryKind::Consumption { lot_id } => Some(lot_id),
        }
    }

    /// Per-unit share of the cost basis.
    ///
    /// Meaningful for lots, whose quantity is validated positive at creation;
    /// returns zero for a zero quantity instead of dividing by it.
    pub fn unit_cost(&self) -> Decimal {
        if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.cost_basis / self.quantity
        }
    }
}
