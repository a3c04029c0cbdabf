//! In-memory ledger store.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use rust_decimal::Decimal;

use stocklot_core::{EntryId, ExpectedRevision, ResourceId, StockError, StockResult};

use crate::entry::{EntryKind, LedgerEntry, LotMetadata};
use crate::store::{ConsumptionDraft, LedgerStore};

/// Per-resource slice of the ledger: the CAS revision plus the entry log.
#[derive(Debug, Default)]
struct ResourceStream {
    revision: u64,
    entries: Vec<LedgerEntry>,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<ResourceId, ResourceStream>,
    /// Entry ids are globally unique; this maps them back to their stream.
    index: HashMap<EntryId, ResourceId>,
}

impl Inner {
    fn lookup_lot(&self, resource_id: ResourceId, lot_id: EntryId) -> StockResult<&LedgerEntry> {
        self.streams
            .get(&resource_id)
            .and_then(|s| s.entries.iter().find(|e| e.id == lot_id))
            .filter(|e| e.is_lot() && e.active)
            .ok_or_else(|| {
                StockError::not_found(format!(
                    "no active lot {lot_id} for resource {resource_id}"
                ))
            })
    }

    /// Lot quantity plus all active (negative) consumptions drawn from it.
    fn lot_available(&self, lot: &LedgerEntry) -> Decimal {
        let consumed: Decimal = self
            .streams
            .get(&lot.resource_id)
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|e| e.active && e.parent_entry_id() == Some(lot.id))
                    .map(|e| e.quantity)
                    .sum()
            })
            .unwrap_or(Decimal::ZERO);
        lot.quantity + consumed
    }
}

/// In-memory append-only ledger store.
///
/// Intended for tests/dev and single-process deployments. Not optimized for
/// performance; a relational adapter would implement the same trait.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<Inner>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn create_lot(
        &self,
        resource_id: ResourceId,
        quantity: Decimal,
        cost_basis: Decimal,
        metadata: LotMetadata,
    ) -> StockResult<LedgerEntry> {
        if quantity <= Decimal::ZERO {
            return Err(StockError::validation(format!(
                "lot quantity must be positive, got {quantity}"
            )));
        }
        if cost_basis < Decimal::ZERO {
            return Err(StockError::validation(format!(
                "cost basis must not be negative, got {cost_basis}"
            )));
        }

        let entry = LedgerEntry {
            id: EntryId::new(),
            resource_id,
            kind: EntryKind::Lot,
            quantity,
            cost_basis,
            created_at: metadata.created_at.unwrap_or_else(Utc::now),
            expires_at: metadata.expires_at,
            batch_label: metadata.batch_label,
            active: true,
            source: metadata.source,
        };

        let mut guard = self
            .inner
            .write()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        let inner = &mut *guard;

        let stream = inner.streams.entry(resource_id).or_default();
        stream.revision += 1;
        stream.entries.push(entry.clone());
        inner.index.insert(entry.id, resource_id);

        Ok(entry)
    }

    fn commit_consumptions(
        &self,
        resource_id: ResourceId,
        drafts: Vec<ConsumptionDraft>,
        expected: ExpectedRevision,
    ) -> StockResult<Vec<LedgerEntry>> {
        if drafts.is_empty() {
            return Err(StockError::validation("empty consumption batch"));
        }

        let mut guard = self
            .inner
            .write()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        let inner = &mut *guard;

        let current = inner.streams.get(&resource_id).map_or(0, |s| s.revision);
        expected.check(current)?;

        // Validate the whole batch against current state before writing
        // anything; a batch may touch one lot more than once.
        let mut taken_per_lot: HashMap<EntryId, Decimal> = HashMap::new();
        for draft in &drafts {
            if draft.quantity >= Decimal::ZERO {
                return Err(StockError::validation(format!(
                    "consumption quantity must be negative, got {}",
                    draft.quantity
                )));
            }
            let lot = inner.lookup_lot(resource_id, draft.lot_id)?;
            let available = inner.lot_available(lot);
            let already = taken_per_lot
                .get(&draft.lot_id)
                .copied()
                .unwrap_or(Decimal::ZERO);
            if available + already + draft.quantity < Decimal::ZERO {
                return Err(StockError::invariant(format!(
                    "consumption of {} would overdraw lot {} (available {})",
                    -draft.quantity,
                    draft.lot_id,
                    available + already
                )));
            }
            *taken_per_lot.entry(draft.lot_id).or_insert(Decimal::ZERO) += draft.quantity;
        }

        let now = Utc::now();
        let mut committed = Vec::with_capacity(drafts.len());
        let stream = inner.streams.entry(resource_id).or_default();
        for draft in drafts {
            let entry = LedgerEntry {
                id: EntryId::new(),
                resource_id,
                kind: EntryKind::Consumption {
                    lot_id: draft.lot_id,
                },
                quantity: draft.quantity,
                cost_basis: Decimal::ZERO,
                created_at: now,
                expires_at: None,
                batch_label: None,
                active: true,
                source: draft.source,
            };
            stream.entries.push(entry.clone());
            committed.push(entry);
        }
        stream.revision += 1;

        for entry in &committed {
            inner.index.insert(entry.id, resource_id);
        }

        Ok(committed)
    }

    fn list_active_lots(&self, resource_id: ResourceId) -> StockResult<Vec<LedgerEntry>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        let mut lots: Vec<LedgerEntry> = guard
            .streams
            .get(&resource_id)
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|e| e.is_lot() && e.active && e.quantity > Decimal::ZERO)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        lots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(lots)
    }

    fn list_consumptions_for(&self, lot_id: EntryId) -> StockResult<Vec<LedgerEntry>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        let resource_id = guard
            .index
            .get(&lot_id)
            .copied()
            .ok_or_else(|| StockError::not_found(format!("no ledger entry {lot_id}")))?;

        Ok(guard
            .streams
            .get(&resource_id)
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|e| e.active && e.parent_entry_id() == Some(lot_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn deactivate(&self, entry_id: EntryId) -> StockResult<LedgerEntry> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        let inner = &mut *guard;

        let resource_id = inner
            .index
            .get(&entry_id)
            .copied()
            .ok_or_else(|| StockError::not_found(format!("no ledger entry {entry_id}")))?;
        let stream = inner
            .streams
            .get_mut(&resource_id)
            .ok_or_else(|| StockError::storage("entry index out of sync"))?;
        let position = stream
            .entries
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or_else(|| StockError::storage("entry index out of sync"))?;

        if !stream.entries[position].active {
            return Err(StockError::conflict(format!(
                "ledger entry {entry_id} is already inactive"
            )));
        }
        if stream.entries[position].is_lot() {
            let live_children = stream
                .entries
                .iter()
                .any(|e| e.active && e.parent_entry_id() == Some(entry_id));
            if live_children {
                return Err(StockError::invariant(format!(
                    "lot {entry_id} still has active consumptions; reverse them first"
                )));
            }
        }

        stream.entries[position].active = false;
        stream.revision += 1;
        Ok(stream.entries[position].clone())
    }

    fn entry(&self, entry_id: EntryId) -> StockResult<LedgerEntry> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        let resource_id = guard
            .index
            .get(&entry_id)
            .copied()
            .ok_or_else(|| StockError::not_found(format!("no ledger entry {entry_id}")))?;

        guard
            .streams
            .get(&resource_id)
            .and_then(|s| s.entries.iter().find(|e| e.id == entry_id))
            .cloned()
            .ok_or_else(|| StockError::storage("entry index out of sync"))
    }

    fn list_entries(&self, resource_id: ResourceId) -> StockResult<Vec<LedgerEntry>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        Ok(guard
            .streams
            .get(&resource_id)
            .map(|s| s.entries.clone())
            .unwrap_or_default())
    }

    fn revision(&self, resource_id: ResourceId) -> StockResult<u64> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        Ok(guard.streams.get(&resource_id).map_or(0, |s| s.revision))
    }
}
