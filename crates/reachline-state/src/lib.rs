//! Durable progress persistence for the Reachline engine.
//!
//! Provides the [`ProgressStore`] trait and a [`SqliteProgressStore`]
//! implementation for work item tracking, run history, per-run outcome
//! audit records, and persisted contact results.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::ProgressStore;
pub use error::StateError;
pub use sqlite::SqliteProgressStore;
