#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! SimStack orchestration – composes planning, simulation fan-out, and
//! critique into one run, and exposes the intake, metrics, and export
//! surfaces consumed by a transport layer.

/// Engine and fleet configuration.
#[path = "../config.rs"]
pub mod config;

/// Run sequencing engine.
#[path = "../engine.rs"]
pub mod engine;

/// Run intake and coordination.
#[path = "../intake.rs"]
pub mod intake;

/// Deployment descriptor export.
#[path = "../compose.rs"]
pub mod compose;

pub use config::EngineConfig;
pub use engine::OrchestrationEngine;
pub use compose::ComposeExport;
pub use intake::{ExportRequest, IntakeError, RunAck, RunCoordinator, RunRequest};
