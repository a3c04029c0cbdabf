//! BOM expansion and recursive cost rollup.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stocklot_core::{CompositeId, ResourceId, StockError, StockResult};

use crate::catalog::{ComponentRef, CompositeCatalog};
use crate::oracle::CostOracle;

/// One node of a quantity-exploded BOM tree.
///
/// `quantity` is the amount declared on the line attaching this node to its
/// *immediate* parent, not multiplied through ancestors; cumulative demand
/// is what `BomEngine::total_requirements` is for. The root node carries the
/// expanded composite itself with quantity one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomNode {
    pub item: ComponentRef,
    pub quantity: Decimal,
    pub optional: bool,
    pub children: Vec<BomNode>,
}

/// Walks the BOM graph for reporting: quantity explosion and cost rollup.
///
/// Works against any `CompositeCatalog`. The catalog behind `add_line`
/// guarantees acyclicity, but the walk still carries a path guard so a
/// misbehaving external catalog yields a `CircularReference` error instead
/// of an endless recursion.
pub struct BomEngine<C, O> {
    catalog: C,
    oracle: O,
}

impl<C, O> BomEngine<C, O>
where
    C: CompositeCatalog,
    O: CostOracle,
{
    pub fn new(catalog: C, oracle: O) -> Self {
        Self { catalog, oracle }
    }

    /// Expand a composite into its full requirement tree.
    pub fn expand(&self, composite_id: CompositeId) -> StockResult<BomNode> {
        let mut path = Vec::new();
        let children = self.expand_children(composite_id, &mut path)?;
        Ok(BomNode {
            item: ComponentRef::Composite(composite_id),
            quantity: Decimal::ONE,
            optional: false,
            children,
        })
    }

    /// Cost of one production run of the composite.
    ///
    /// Leaf lines price through the cost oracle, composite lines through
    /// recursion; either way the line's `quantity_per_yield` is the
    /// multiplier. A composite with no lines costs zero. Optional lines are
    /// part of the declared recipe and are included.
    pub fn rollup_cost(&self, composite_id: CompositeId) -> StockResult<Decimal> {
        let mut path = Vec::new();
        self.rollup_guarded(composite_id, &mut path)
    }

    /// Cost per unit produced: `rollup_cost / yield_quantity`.
    pub fn rollup_unit_cost(&self, composite_id: CompositeId) -> StockResult<Decimal> {
        let item = self.catalog.composite(composite_id)?;
        if item.yield_quantity <= Decimal::ZERO {
            return Err(StockError::invariant(format!(
                "composite {composite_id} has a non-positive yield quantity"
            )));
        }
        Ok(self.rollup_cost(composite_id)? / item.yield_quantity)
    }

    /// Cumulative leaf-resource demand for one production run, ancestor
    /// multipliers applied, aggregated per resource in first-seen order.
    pub fn total_requirements(
        &self,
        composite_id: CompositeId,
    ) -> StockResult<Vec<(ResourceId, Decimal)>> {
        let mut totals: Vec<(ResourceId, Decimal)> = Vec::new();
        let mut path = Vec::new();
        self.accumulate(composite_id, Decimal::ONE, &mut totals, &mut path)?;
        Ok(totals)
    }

    fn expand_children(
        &self,
        composite_id: CompositeId,
        path: &mut Vec<CompositeId>,
    ) -> StockResult<Vec<BomNode>> {
        guard_path(composite_id, path)?;
        path.push(composite_id);

        let mut nodes = Vec::new();
        for line in self.catalog.lines(composite_id)? {
            let children = match line.child {
                ComponentRef::Composite(child_id) => self.expand_children(child_id, path)?,
                ComponentRef::Resource(_) => Vec::new(),
            };
            nodes.push(BomNode {
                item: line.child,
                quantity: line.quantity_per_yield,
                optional: line.optional,
                children,
            });
        }

        path.pop();
        Ok(nodes)
    }

    fn rollup_guarded(
        &self,
        composite_id: CompositeId,
        path: &mut Vec<CompositeId>,
    ) -> StockResult<Decimal> {
        guard_path(composite_id, path)?;
        path.push(composite_id);

        let mut total = Decimal::ZERO;
        for line in self.catalog.lines(composite_id)? {
            let each = match line.child {
                ComponentRef::Resource(resource_id) => self.oracle.unit_cost(resource_id),
                ComponentRef::Composite(child_id) => self.rollup_guarded(child_id, path)?,
            };
            total += each * line.quantity_per_yield;
        }

        path.pop();
        Ok(total)
    }

    fn accumulate(
        &self,
        composite_id: CompositeId,
        multiplier: Decimal,
        totals: &mut Vec<(ResourceId, Decimal)>,
        path: &mut Vec<CompositeId>,
    ) -> StockResult<()> {
        guard_path(composite_id, path)?;
        path.push(composite_id);

        for line in self.catalog.lines(composite_id)? {
            let required = multiplier * line.quantity_per_yield;
            match line.child {
                ComponentRef::Resource(resource_id) => {
                    match totals.iter_mut().find(|(id, _)| *id == resource_id) {
                        Some((_, quantity)) => *quantity += required,
                        None => totals.push((resource_id, required)),
                    }
                }
                ComponentRef::Composite(child_id) => {
                    self.accumulate(child_id, required, totals, path)?;
                }
            }
        }

        path.pop();
        Ok(())
    }
}

fn guard_path(composite_id: CompositeId, path: &[CompositeId]) -> StockResult<()> {
    if let Some(start) = path.iter().position(|id| *id == composite_id) {
        let mut cycle = path[start..].to_vec();
        cycle.push(composite_id);
        return Err(StockError::cycle(cycle));
    }
    Ok(())
}
