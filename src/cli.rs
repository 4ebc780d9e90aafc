//! CLI argument parsing for tabload

use std::path::PathBuf;

use clap::Parser;

use crate::ingestion::BatchErrorPolicy;
use crate::runner::{RunConfig, RunMode};

#[derive(Parser, Debug)]
#[command(name = "tabload")]
#[command(author, version, about = "Descriptor-driven bulk transfer between files and a database", long_about = None)]
pub struct Cli {
    /// Descriptor file or glob of descriptor files
    #[arg(required = true)]
    pub descriptors: String,

    /// Run each descriptor's SQLStatements instead of mapping rows
    #[arg(long)]
    pub execute_sql: bool,

    /// Print all rows of each descriptor's target table
    #[arg(long)]
    pub select_all: bool,

    /// Drop the target table and run this SQL file before transferring
    #[arg(long, value_name = "FILE")]
    pub bootstrap: Option<PathBuf>,

    /// What to do with the rest of a file after a chunk fails: abort or continue
    #[arg(long, value_name = "POLICY", value_parser = parse_policy)]
    pub on_batch_error: Option<BatchErrorPolicy>,

    /// Directory for per-input error logs
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub error_log_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: log::LevelFilter,
}

fn parse_policy(s: &str) -> Result<BatchErrorPolicy, String> {
    s.parse()
}

impl Cli {
    /// Run options selected by these arguments.
    pub fn run_config(&self) -> RunConfig {
        let mode = RunMode::from_flags(self.execute_sql, self.select_all, self.bootstrap.clone());
        let mut config = RunConfig::new(&self.descriptors)
            .with_mode(mode)
            .with_error_log_dir(&self.error_log_dir);
        if let Some(policy) = self.on_batch_error {
            config = config.with_batch_policy(policy);
        }
        config
    }
}
