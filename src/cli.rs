use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use reclaim::config::{OptimizationMode, Settings};
use reclaim::utils::parse_size;

#[derive(Parser)]
#[command(
    name = "reclaim",
    about = "Reclaim disk space: find, classify and remove junk files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (TOML). Defaults to <config dir>/reclaim/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every per-file decision
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan for junk files (no deletion)
    Scan {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Clean junk files (requires --confirm to actually delete)
    Clean {
        /// Actually delete files. Without this flag, behaves like a dry run.
        #[arg(long)]
        confirm: bool,

        /// Copy each file into the backup directory before deleting it
        #[arg(long)]
        backup: bool,

        /// Files above this size are deleted without a backup copy (e.g. 100MB)
        #[arg(long, requires = "backup", value_parser = parse_size)]
        backup_max_size: Option<u64>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List category names
    Categories,

    /// Classify files and print why each is or is not safe to delete
    Inspect {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Only this category (see `reclaim categories`), or "all"
    #[arg(long, default_value = "all")]
    pub category: String,

    /// Skip the per-file safety classification
    #[arg(long)]
    pub no_security_checks: bool,

    /// Which system-optimization tiers to process
    #[arg(long, value_enum)]
    pub mode: Option<OptimizationMode>,

    /// Run up to this many categories at once during a full run
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Write a plain-text summary report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl RunArgs {
    /// Flags win over the settings file.
    pub fn apply(&self, settings: &mut Settings) {
        if self.no_security_checks {
            settings.security_checks = false;
        }
        if let Some(mode) = self.mode {
            settings.optimization_mode = mode;
        }
        if let Some(parallel) = self.parallel {
            settings.max_parallel_categories = parallel.max(1);
        }
        if let Some(report) = &self.report {
            settings.report_path = Some(report.clone());
        }
    }
}
