//! kvmigrate - copy one versioned key-value store into another.
//!
//! A migration lists every entry of a source backend at its current revision
//! and replays the entries, in key order, into an independent destination
//! backend. Keys, values, and lease associations are preserved; revisions are
//! assigned fresh by the destination.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  CLI  (--from / --to)                    │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//! ┌──────────────────────────────────────────────────────────┐
//! │          Runtime (phases, shared shutdown context)       │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//! ┌──────────────────────────────────────────────────────────┐
//! │     Migrator: list source → create / update on conflict  │
//! └──────────────────────────────────────────────────────────┘
//!                 │                            │
//! ┌─────────────────────────┐    ┌─────────────────────────┐
//! │     Source Backend      │    │   Destination Backend   │
//! └─────────────────────────┘    └─────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`backend`] - Backend contract, endpoints, and in-process stores
//! - [`migrate`] - Copy algorithm and phase state machine
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Shutdown context and run orchestration
//! - [`core::logging`] - Log subscriber setup
//! - [`core::error`] - Error types
//! - [`cli`] - Command-line interface
//!
//! # Guarantees
//!
//! - Entries are written sequentially in source key order
//! - Only a create conflict is recovered from (by an unconditional update)
//! - Any other failure stops the copy; already written entries stay written
//! - Running the same migration twice yields the same destination content

// Core infrastructure
pub mod core;

// Backend contract and implementations
pub mod backend;

// Migration driver
pub mod migrate;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, logging, runtime};
pub use backend::{Backend, KeyValue, ListResult, UpdateResult};
pub use migrate::{MigrationPhase, MigrationReport, Migrator};
