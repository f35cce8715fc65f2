//! Disk-space reclamation engine.
//!
//! Category templates are expanded into concrete locations, walked under
//! depth and file budgets, classified for safety, ordered by a priority score
//! and deleted in bounded concurrent batches. Every level folds its outcome
//! into a [`cleaner::CleanupResult`] and keeps going past partial failure.

pub mod backup;
pub mod catalog;
pub mod categories;
pub mod cleaner;
pub mod config;
pub mod deleter;
pub mod disk_info;
pub mod error;
pub mod executor;
pub mod expander;
pub mod orchestrator;
pub mod processes;
pub mod progress;
pub mod report;
pub mod scoring;
pub mod security;
pub mod utils;
pub mod walker;
