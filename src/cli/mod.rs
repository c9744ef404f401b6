//! Command-line interface for jobboard.
//!
//! Provides commands for crawling listings, browsing stored jobs and
//! exporting the database.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
