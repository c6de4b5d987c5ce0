//! # Analyst Tools
//!
//! Built-in tools for the plan executor:
//! - run_query: natural-language question to a result table
//! - aggregate: group-by reduction over a table
//! - plot: line chart rendered as SVG bytes
//! - stat_test: Pearson correlation or Welch's t-test
//!
//! All four are part of the fixed catalog: they cannot be disabled or
//! deleted at runtime.

mod aggregate;
mod plot;
mod query;
mod stat;

use std::sync::Arc;

use analyst_core::tool::ToolRegistry;
use analyst_query::QueryGenerator;

pub use aggregate::AggregateTool;
pub use plot::PlotTool;
pub use query::RunQueryTool;
pub use stat::StatTestTool;

/// Registry preloaded with the fixed catalog.
pub fn builtin_registry(generator: Arc<QueryGenerator>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(RunQueryTool::new(generator)));
    registry.register(Arc::new(AggregateTool));
    registry.register(Arc::new(PlotTool));
    registry.register(Arc::new(StatTestTool));
    registry
}
