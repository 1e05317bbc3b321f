#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! SimStack planner – turns a goal into a set of what-if variants, either via
//! the inference service or a deterministic fallback grid.

/// Plan and variant data model.
#[path = "../plan.rs"]
pub mod plan;

/// Simulation tool catalog.
#[path = "../catalog.rs"]
pub mod catalog;

/// Deterministic fallback variant grid.
#[path = "../grid.rs"]
pub mod grid;

/// Plan generation engine.
#[path = "../engine.rs"]
pub mod engine;

pub use catalog::{default_catalog, ToolSpec};
pub use engine::{PlanGenerator, PlanOutcome};
pub use grid::fallback_grid;
pub use plan::{Plan, Variant};
