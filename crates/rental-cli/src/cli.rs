//! CLI argument definitions for the rental ETL.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "rental-etl",
    version,
    about = "Build the rental flat sheet from a listings/calendar/reviews snapshot",
    long_about = "Extract a short-term rental snapshot, clean and impute it, and load \
                  one row per listing-day into SQLite and size-bounded CSV files."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format.
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Append logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run extraction, transformation and load.
    Run(RunArgs),

    /// Print the effective pipeline configuration as TOML.
    Config(ConfigArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Snapshot store location (a directory, optionally prefixed with file://).
    #[arg(long = "source", value_name = "URI", default_value = "file://data/snapshots")]
    pub source: String,

    /// Database directory inside the store.
    #[arg(long = "database", value_name = "NAME", default_value = "rentals")]
    pub database: String,

    #[arg(long = "listings", value_name = "COLLECTION", default_value = "listings")]
    pub listings: String,

    #[arg(long = "calendar", value_name = "COLLECTION", default_value = "calendar")]
    pub calendar: String,

    #[arg(long = "reviews", value_name = "COLLECTION", default_value = "reviews")]
    pub reviews: String,

    /// SQLite database file.
    #[arg(long = "sqlite-path", value_name = "PATH", default_value = "data/rentals.db")]
    pub sqlite_path: PathBuf,

    /// Target table name.
    #[arg(long = "table", value_name = "NAME", default_value = "flat_sheet")]
    pub table: String,

    /// Replace the table or append to it.
    #[arg(long = "mode", value_enum, default_value = "replace")]
    pub mode: WriteModeArg,

    /// Base path for the CSV parts (`{stem}_part{n}.csv`).
    #[arg(long = "export-path", value_name = "PATH", default_value = "data/flat_sheet.csv")]
    pub export_path: PathBuf,

    /// Data rows per export file (capped at the spreadsheet row limit).
    #[arg(long = "max-rows", value_name = "ROWS")]
    pub max_rows: Option<usize>,

    /// Maximum characters kept in a text cell; 0 disables truncation.
    #[arg(long = "truncate-text", value_name = "CHARS", default_value_t = 32_767)]
    pub truncate_text: usize,

    /// Skip the CSV export.
    #[arg(long = "no-export")]
    pub no_export: bool,

    /// Skip the SQLite load.
    #[arg(long = "no-sqlite")]
    pub no_sqlite: bool,

    /// Pipeline configuration overrides (TOML).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Parser)]
pub struct ConfigArgs {
    /// Show the defaults merged with this file.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum WriteModeArg {
    Replace,
    Append,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["rental-etl", "run"]).expect("parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.table, "flat_sheet");
        assert_eq!(args.truncate_text, 32_767);
        assert!(matches!(args.mode, WriteModeArg::Replace));
        assert!(!args.no_export && !args.no_sqlite);
    }

    #[test]
    fn run_flags() {
        let cli = Cli::try_parse_from([
            "rental-etl",
            "--log-format",
            "json",
            "run",
            "--source",
            "file:///tmp/store",
            "--mode",
            "append",
            "--max-rows",
            "1000",
            "--no-export",
        ])
        .expect("parse");
        assert!(matches!(cli.log_format, LogFormatArg::Json));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.source, "file:///tmp/store");
        assert!(matches!(args.mode, WriteModeArg::Append));
        assert_eq!(args.max_rows, Some(1000));
        assert!(args.no_export);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result = Cli::try_parse_from(["rental-etl", "run", "--mode", "upsert"]);
        assert!(result.is_err());
    }
}
