//! Core runtime infrastructure.
//!
//! This module contains the essential components for running a migration:
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Shutdown coordination and migration orchestration
//! - [`logging`] - Subscriber setup from an explicit log configuration
//! - [`error`] - Error types for backends and the migration driver

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
