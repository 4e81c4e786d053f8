//! CLI Adapter
//!
//! Command-line interface for lead-scout.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{CliApp, Command, QuotaCmd, RunCmd};

/// Parse the process arguments
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}
