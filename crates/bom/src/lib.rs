//! stocklot-bom: bill-of-materials graph, expansion, and cost rollup.
//!
//! Composites (buildable items) reference leaf resources or other
//! composites through quantity-bearing lines. [`InMemoryBomGraph`] stores
//! the graph and rejects any line that would close a cycle, however long;
//! [`BomEngine`] walks a [`CompositeCatalog`] to produce requirement trees,
//! cumulative demand, and recursive cost rollups priced through a
//! [`CostOracle`].

pub mod catalog;
pub mod engine;
pub mod graph;
pub mod oracle;

pub use catalog::{BomLine, ComponentRef, CompositeCatalog, CompositeItem};
pub use engine::{BomEngine, BomNode};
pub use graph::InMemoryBomGraph;
pub use oracle::{CostOracle, FixedCosts};
