//! Metric definitions for mcpbox.
//!
//! Consumers record through the `metrics` facade macros re-exported here,
//! using the names in [`mcp`], [`orchestrator`] and [`sandbox`]. Nothing is
//! exported unless the embedding binary installs a recorder.
//!
//! ```rust,ignore
//! use mcpbox_metrics::{counter, labels, mcp};
//!
//! counter!(mcp::TOOL_CALLS_TOTAL, labels::SERVER => "alpha").increment(1);
//! ```

mod definitions;

pub use definitions::*;

pub use metrics::{counter, gauge, histogram};
