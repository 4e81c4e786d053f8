//! CLI Commands
//!
//! Argument definitions for the lead-scout binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::adapters::export::ExportFormat;

/// Lead Scout - quota-aware lead discovery, enrichment and scoring
#[derive(Parser, Debug)]
#[command(
    name = "lead-scout",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Quota-aware lead discovery, enrichment and scoring",
    long_about = "Lead Scout searches business directories for leads, enriches the \
                  promising ones through a score-gated staircase of providers and \
                  exports them scored and tiered, without exceeding any provider's \
                  daily or monthly call budget."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover, enrich, score and export leads
    Run(RunCmd),

    /// Show provider quota usage
    Quota(QuotaCmd),
}

/// Run the lead pipeline
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Business category to search for (e.g. "HVAC")
    #[arg(short, long, value_name = "TERM")]
    pub term: String,

    /// Where to search (e.g. "Milton, Ontario")
    #[arg(short, long, value_name = "LOCATION")]
    pub location: String,

    /// Maximum leads to collect (defaults to pipeline.default_limit)
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Export file (defaults to pipeline.output)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Export format (json, csv); defaults to the output file's extension
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ExportFormat>,

    /// Cancel the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Show quota usage
#[derive(Parser, Debug)]
pub struct QuotaCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let app = CliApp::parse_from([
            "lead-scout",
            "-v",
            "run",
            "--term",
            "HVAC",
            "--location",
            "Milton, Ontario",
            "-n",
            "10",
        ]);
        assert!(app.verbose);
        match app.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.term, "HVAC");
                assert_eq!(cmd.location, "Milton, Ontario");
                assert_eq!(cmd.limit, Some(10));
                assert_eq!(cmd.config, PathBuf::from("config/default.toml"));
                assert!(cmd.output.is_none());
                assert!(cmd.format.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_quota_with_global_flag_after_subcommand() {
        let app = CliApp::parse_from(["lead-scout", "quota", "--debug", "-f", "json"]);
        assert!(app.debug);
        assert!(matches!(app.command, Command::Quota(ref cmd) if cmd.format == "json"));
    }

    #[test]
    fn test_parse_run_export_format() {
        let app = CliApp::parse_from([
            "lead-scout",
            "run",
            "-t",
            "HVAC",
            "-l",
            "Milton",
            "-o",
            "leads.txt",
            "--format",
            "csv",
        ]);
        match app.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.output, Some(PathBuf::from("leads.txt")));
                assert_eq!(cmd.format, Some(ExportFormat::Csv));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(CliApp::try_parse_from([
            "lead-scout", "run", "-t", "HVAC", "-l", "Milton", "--format", "xlsx"
        ])
        .is_err());
    }

    #[test]
    fn test_run_requires_term() {
        assert!(CliApp::try_parse_from(["lead-scout", "run", "--location", "Milton"]).is_err());
    }
}
