#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! SimStack simulation fan-out – per-tool parameter extraction, HTTP
//! invocation, per-variant dispatch, and bounded cross-variant aggregation.

/// Per-tool parameter subset extraction.
#[path = "../extractor.rs"]
pub mod extractor;

/// Simulation service invocation.
#[path = "../invoker.rs"]
pub mod invoker;

/// Per-variant multi-tool dispatch.
#[path = "../dispatcher.rs"]
pub mod dispatcher;

/// Cross-variant bounded-parallel aggregation.
#[path = "../aggregator.rs"]
pub mod aggregator;

pub use aggregator::ResultAggregator;
pub use dispatcher::{SimulationDispatcher, SimulationResult};
pub use extractor::extract_tool_params;
pub use invoker::{HttpToolInvoker, ToolError, ToolInvoker};
