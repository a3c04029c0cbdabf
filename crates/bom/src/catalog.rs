//! Composite item and BOM line definitions.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stocklot_core::{CompositeId, LineId, ResourceId, StockResult};

/// An item produced from other items (a recipe).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeItem {
    pub id: CompositeId,
    pub name: String,
    /// Units produced per production run; always positive.
    pub yield_quantity: Decimal,
}

/// What a BOM line points at: a leaf stock resource or another composite.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentRef {
    Resource(ResourceId),
    Composite(CompositeId),
}

impl ComponentRef {
    pub fn as_composite(&self) -> Option<CompositeId> {
        match self {
            ComponentRef::Composite(id) => Some(*id),
            ComponentRef::Resource(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ComponentRef::Resource(_))
    }
}

/// One line of a composite's recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    pub id: LineId,
    pub parent_id: CompositeId,
    pub child: ComponentRef,
    /// Amount of the child required per one `yield_quantity` of the parent.
    pub quantity_per_yield: Decimal,
    /// Display/processing order, assigned at insertion.
    pub position: u32,
    pub optional: bool,
}

/// Read access to composite definitions.
///
/// The catalog editing workflow lives outside the core. Expansion and
/// rollup only need this shape, which keeps them testable against
/// handwritten catalogs.
pub trait CompositeCatalog: Send + Sync {
    fn composite(&self, id: CompositeId) -> StockResult<CompositeItem>;

    /// Lines of the composite, in `position` order.
    fn lines(&self, id: CompositeId) -> StockResult<Vec<BomLine>>;
}

impl<C> CompositeCatalog for Arc<C>
where
    C: CompositeCatalog + ?Sized,
{
    fn composite(&self, id: CompositeId) -> StockResult<CompositeItem> {
        (**self).composite(id)
    }

    fn lines(&self, id: CompositeId) -> StockResult<Vec<BomLine>> {
        (**self).lines(id)
    }
}

impl<C> CompositeCatalog for &C
where
    C: CompositeCatalog + ?Sized,
{
    fn composite(&self, id: CompositeId) -> StockResult<CompositeItem> {
        (**self).composite(id)
    }

    fn lines(&self, id: CompositeId) -> StockResult<Vec<BomLine>> {
        (**self).lines(id)
    }
}
