//! CLI command implementations.

mod migrate;

pub use migrate::{conclude, load_config, run_migrate};
