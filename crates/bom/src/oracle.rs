//! Leaf-resource cost sourcing for the rollup.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use stocklot_core::ResourceId;

/// Per-unit cost of a leaf resource, supplied by the surrounding system.
///
/// Implementations must return zero (or their own defined default) for
/// resources with no cost history; a missing price never fails a whole
/// rollup, which is why the lookup is infallible.
pub trait CostOracle: Send + Sync {
    fn unit_cost(&self, resource_id: ResourceId) -> Decimal;
}

impl<O> CostOracle for Arc<O>
where
    O: CostOracle + ?Sized,
{
    fn unit_cost(&self, resource_id: ResourceId) -> Decimal {
        (**self).unit_cost(resource_id)
    }
}

impl<O> CostOracle for &O
where
    O: CostOracle + ?Sized,
{
    fn unit_cost(&self, resource_id: ResourceId) -> Decimal {
        (**self).unit_cost(resource_id)
    }
}

/// Fixed cost table with a default for unknown resources.
///
/// Fits catalogs priced by an external component, and doubles as the test
/// oracle.
#[derive(Debug, Clone, Default)]
pub struct FixedCosts {
    costs: HashMap<ResourceId, Decimal>,
    default: Decimal,
}

impl FixedCosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(default: Decimal) -> Self {
        Self {
            costs: HashMap::new(),
            default,
        }
    }

    pub fn set(&mut self, resource_id: ResourceId, unit_cost: Decimal) {
        self.costs.insert(resource_id, unit_cost);
    }
}

impl CostOracle for FixedCosts {
    fn unit_cost(&self, resource_id: ResourceId) -> Decimal {
        self.costs.get(&resource_id).copied().unwrap_or(self.default)
    }
}
