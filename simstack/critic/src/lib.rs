#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! SimStack critic – ranks aggregated simulation results via the inference
//! service, degrading to a deterministic heuristic when it is unusable.

/// Analysis data model.
#[path = "../analysis.rs"]
pub mod analysis;

/// Deterministic heuristic ranking.
#[path = "../heuristic.rs"]
pub mod heuristic;

/// Critique engine.
#[path = "../engine.rs"]
pub mod engine;

pub use analysis::Analysis;
pub use engine::CriticAnalyzer;
pub use heuristic::{MetricDirection, ScoringTable};
