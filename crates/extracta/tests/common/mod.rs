//! Shared test utilities for extracta integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring SQLite, a filesystem blob store and a scripted model
//! - `ScriptedModel`, a `StructuredModel` that answers by request purpose
//! - Builders for document fixtures (CSV, DOCX, PDF, email)

pub mod builders;
pub mod harness;
pub mod model;

pub use builders::*;
pub use harness::TestHarness;
pub use model::ScriptedModel;
