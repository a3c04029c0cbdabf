//! BOM graph with cycle enforcement at edge insertion.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use rust_decimal::Decimal;

use stocklot_core::{CompositeId, LineId, StockError, StockResult};

use crate::catalog::{BomLine, ComponentRef, CompositeCatalog, CompositeItem};

#[derive(Debug, Default)]
struct GraphInner {
    composites: HashMap<CompositeId, CompositeItem>,
    /// Lines per parent, in insertion (= position) order.
    lines: HashMap<CompositeId, Vec<BomLine>>,
    line_index: HashMap<LineId, CompositeId>,
}

impl GraphInner {
    /// BFS from `start` along composite edges; returns the chain
    /// `start -> ... -> target` if `target` is reachable.
    fn path_to(&self, start: CompositeId, target: CompositeId) -> Option<Vec<CompositeId>> {
        if start == target {
            return Some(vec![start]);
        }

        let mut predecessor: HashMap<CompositeId, CompositeId> = HashMap::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            let Some(lines) = self.lines.get(&current) else {
                continue;
            };
            for line in lines {
                let Some(next) = line.child.as_composite() else {
                    continue;
                };
                if !visited.insert(next) {
                    continue;
                }
                predecessor.insert(next, current);
                if next == target {
                    let mut path = vec![target];
                    let mut at = target;
                    while let Some(&prev) = predecessor.get(&at) {
                        path.push(prev);
                        at = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }

        None
    }
}

/// In-memory composite catalog plus the graph mutations that must stay
/// cycle-safe.
///
/// The cycle check walks the full transitive closure with a visited set;
/// there is deliberately no depth limit, since any cap can miss cycles
/// deeper than itself. Check and insert share one write lock, so two
/// concurrent `add_line` calls cannot each pass the check against a stale
/// graph and jointly create a cycle.
#[derive(Debug, Default)]
pub struct InMemoryBomGraph {
    inner: RwLock<GraphInner>,
}

impl InMemoryBomGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a composite so lines can reference it.
    ///
    /// The full catalog editing workflow (naming, versioning, approval) is
    /// external; this is the minimal hook it calls into.
    pub fn create_composite(
        &self,
        name: impl Into<String>,
        yield_quantity: Decimal,
    ) -> StockResult<CompositeItem> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StockError::validation("composite name must not be empty"));
        }
        if yield_quantity <= Decimal::ZERO {
            return Err(StockError::validation(format!(
                "yield quantity must be positive, got {yield_quantity}"
            )));
        }

        let item = CompositeItem {
            id: CompositeId::new(),
            name,
            yield_quantity,
        };

        let mut inner = self
            .inner
            .write()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        inner.composites.insert(item.id, item.clone());
        Ok(item)
    }

    /// Append a line to a composite's recipe.
    ///
    /// Fails with `CircularReference` if the child composite transitively
    /// requires the parent; the error carries the offending cycle path.
    pub fn add_line(
        &self,
        parent_id: CompositeId,
        child: ComponentRef,
        quantity_per_yield: Decimal,
        optional: bool,
    ) -> StockResult<BomLine> {
        if quantity_per_yield <= Decimal::ZERO {
            return Err(StockError::validation(format!(
                "quantity per yield must be positive, got {quantity_per_yield}"
            )));
        }

        let mut guard = self
            .inner
            .write()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        let inner = &mut *guard;

        if !inner.composites.contains_key(&parent_id) {
            return Err(StockError::not_found(format!("no composite {parent_id}")));
        }
        if let Some(child_id) = child.as_composite() {
            if !inner.composites.contains_key(&child_id) {
                return Err(StockError::not_found(format!("no composite {child_id}")));
            }
            if let Some(chain) = inner.path_to(child_id, parent_id) {
                let mut path = vec![parent_id];
                path.extend(chain);
                return Err(StockError::cycle(path));
            }
        }

        let position = inner
            .lines
            .get(&parent_id)
            .and_then(|lines| lines.last())
            .map_or(1, |last| last.position + 1);
        let line = BomLine {
            id: LineId::new(),
            parent_id,
            child,
            quantity_per_yield,
            position,
            optional,
        };
        inner.lines.entry(parent_id).or_default().push(line.clone());
        inner.line_index.insert(line.id, parent_id);
        Ok(line)
    }

    pub fn remove_line(&self, line_id: LineId) -> StockResult<BomLine> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        let inner = &mut *guard;

        let parent_id = inner
            .line_index
            .remove(&line_id)
            .ok_or_else(|| StockError::not_found(format!("no bom line {line_id}")))?;
        let lines = inner
            .lines
            .get_mut(&parent_id)
            .ok_or_else(|| StockError::storage("line index out of sync"))?;
        let at = lines
            .iter()
            .position(|l| l.id == line_id)
            .ok_or_else(|| StockError::storage("line index out of sync"))?;
        Ok(lines.remove(at))
    }

    pub fn list_lines(&self, composite_id: CompositeId) -> StockResult<Vec<BomLine>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        if !guard.composites.contains_key(&composite_id) {
            return Err(StockError::not_found(format!(
                "no composite {composite_id}"
            )));
        }
        Ok(guard.lines.get(&composite_id).cloned().unwrap_or_default())
    }

    pub fn list_composites(&self) -> StockResult<Vec<CompositeItem>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        let mut items: Vec<CompositeItem> = guard.composites.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Would the edge `candidate_parent -> candidate_child` create a cycle?
    ///
    /// Pure query for catalog editors validating before save; ids that are
    /// not registered simply have no requirements yet, so the answer for
    /// them is `false` (except the self-edge, which is always circular).
    pub fn has_circular_reference(
        &self,
        candidate_parent: CompositeId,
        candidate_child: CompositeId,
    ) -> StockResult<bool> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        Ok(guard.path_to(candidate_child, candidate_parent).is_some())
    }
}

impl CompositeCatalog for InMemoryBomGraph {
    fn composite(&self, id: CompositeId) -> StockResult<CompositeItem> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        guard
            .composites
            .get(&id)
            .cloned()
            .ok_or_else(|| StockError::not_found(format!("no composite {id}")))
    }

    fn lines(&self, id: CompositeId) -> StockResult<Vec<BomLine>> {
        self.list_lines(id)
    }
}
