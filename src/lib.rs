//! SpotGrid Backend Library
//!
//! Exposes the spot store and both assignment engines for use by the CLI
//! binary and integration tests.

pub mod billcode;
pub mod engine;
pub mod models;
pub mod reference;
pub mod store;

// Re-export the main entry points for convenience
pub use engine::blocks::BlockAssignmentEngine;
pub use engine::language::LanguageResolver;
pub use engine::orchestrator::{CategorizationService, PipelineOrchestrator};
pub use store::SpotStore;
