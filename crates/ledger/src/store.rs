//! Append-only ledger store boundary.

use std::sync::Arc;

use rust_decimal::Decimal;

use stocklot_core::{EntryId, ExpectedRevision, ResourceId, StockError, StockResult};

use crate::entry::{LedgerEntry, LotMetadata, SourceRef};

/// A consumption waiting to be committed (no id or timestamp assigned yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionDraft {
    /// Lot the consumption is drawn from.
    pub lot_id: EntryId,
    /// Signed quantity to apply; must be negative.
    pub quantity: Decimal,
    pub source: Option<SourceRef>,
}

/// Append-only, per-resource lot/consumption store.
///
/// This is the persistence boundary of the stock core. It enforces
/// referential validity only (lots exist, belong to the right resource, are
/// never overdrawn) and leaves FIFO policy entirely to the consumption
/// engine, which stays independently testable against a fake implementation.
///
/// ## Streams and revisions
///
/// Entries are organized per `resource_id`. Every mutation of a resource's
/// ledger (new lot, committed consumptions, deactivation) bumps that
/// resource's revision counter, which `commit_consumptions` checks against
/// the caller's `ExpectedRevision`. Different resources never contend.
///
/// ## Append semantics
///
/// Entries are immutable once written; the only in-place change ever made is
/// flipping the `active` flag through `deactivate`. A failed call writes
/// nothing.
pub trait LedgerStore: Send + Sync {
    /// Record an inbound lot.
    ///
    /// Fails with `Validation` if `quantity <= 0` or `cost_basis < 0`.
    fn create_lot(
        &self,
        resource_id: ResourceId,
        quantity: Decimal,
        cost_basis: Decimal,
        metadata: LotMetadata,
    ) -> StockResult<LedgerEntry>;

    /// Atomically append a batch of consumption entries.
    ///
    /// Validates every draft against current state first (negative quantity,
    /// lot exists for this resource and is active, no lot overdrawn even
    /// cumulatively within the batch), checks `expected` against the
    /// resource's revision, then writes all entries and bumps the revision
    /// once. All or nothing.
    fn commit_consumptions(
        &self,
        resource_id: ResourceId,
        drafts: Vec<ConsumptionDraft>,
        expected: ExpectedRevision,
    ) -> StockResult<Vec<LedgerEntry>>;

    /// Active lots of a resource with a positive quantity, ordered by
    /// `created_at` ascending, ties broken by `id` ascending.
    fn list_active_lots(&self, resource_id: ResourceId) -> StockResult<Vec<LedgerEntry>>;

    /// Active consumption entries drawn from the given lot.
    fn list_consumptions_for(&self, lot_id: EntryId) -> StockResult<Vec<LedgerEntry>>;

    /// Soft-delete one entry; historical totals of other entries are
    /// untouched.
    ///
    /// Deactivating a consumption reverses it (the parent lot's availability
    /// grows back). Deactivating a lot that still has active consumptions is
    /// an `Invariant` error; deactivating twice is a `Conflict`. Bumps the
    /// resource revision, since availability changed.
    fn deactivate(&self, entry_id: EntryId) -> StockResult<LedgerEntry>;

    /// Point lookup by entry id.
    fn entry(&self, entry_id: EntryId) -> StockResult<LedgerEntry>;

    /// Full per-resource history (lots and consumptions, any active state),
    /// in insertion order.
    fn list_entries(&self, resource_id: ResourceId) -> StockResult<Vec<LedgerEntry>>;

    /// Current revision of the resource's ledger; 0 for untouched resources.
    fn revision(&self, resource_id: ResourceId) -> StockResult<u64>;

    /// Record a single consumption against one lot.
    ///
    /// Convenience over `commit_consumptions` with no revision check; same
    /// validation. Fails with `NotFound` if `lot_id` is not an active lot of
    /// `resource_id`, `Validation` if `quantity >= 0`.
    fn create_consumption(
        &self,
        resource_id: ResourceId,
        lot_id: EntryId,
        quantity: Decimal,
        source: Option<SourceRef>,
    ) -> StockResult<LedgerEntry> {
        let mut committed = self.commit_consumptions(
            resource_id,
            vec![ConsumptionDraft {
                lot_id,
                quantity,
                source,
            }],
            ExpectedRevision::Any,
        )?;
        committed
            .pop()
            .ok_or_else(|| StockError::storage("commit returned an empty batch"))
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn create_lot(
        &self,
        resource_id: ResourceId,
        quantity: Decimal,
        cost_basis: Decimal,
        metadata: LotMetadata,
    ) -> StockResult<LedgerEntry> {
        (**self).create_lot(resource_id, quantity, cost_basis, metadata)
    }

    fn commit_consumptions(
        &self,
        resource_id: ResourceId,
        drafts: Vec<ConsumptionDraft>,
        expected: ExpectedRevision,
    ) -> StockResult<Vec<LedgerEntry>> {
        (**self).commit_consumptions(resource_id, drafts, expected)
    }

    fn list_active_lots(&self, resource_id: ResourceId) -> StockResult<Vec<LedgerEntry>> {
        (**self).list_active_lots(resource_id)
    }

    fn list_consumptions_for(&self, lot_id: EntryId) -> StockResult<Vec<LedgerEntry>> {
        (**self).list_consumptions_for(lot_id)
    }

    fn deactivate(&self, entry_id: EntryId) -> StockResult<LedgerEntry> {
        (**self).deactivate(entry_id)
    }

    fn entry(&self, entry_id: EntryId) -> StockResult<LedgerEntry> {
        (**self).entry(entry_id)
    }

    fn list_entries(&self, resource_id: ResourceId) -> StockResult<Vec<LedgerEntry>> {
        (**self).list_entries(resource_id)
    }

    fn revision(&self, resource_id: ResourceId) -> StockResult<u64> {
        (**self).revision(resource_id)
    }
}
