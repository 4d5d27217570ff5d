use std::path::Path;

use anyhow::{Context, Result};
use rental_cli::etl::{run_etl, text_columns};
use rental_cli::types::{CollectionNames, EtlOptions, EtlResult, ExportTarget, SqliteTarget};
use rental_model::PipelineConfig;
use rental_output::{ExportOptions, SPREADSHEET_ROW_LIMIT, WriteMode};
use tracing::info;

use crate::cli::{ConfigArgs, RunArgs, WriteModeArg};

pub fn run(args: &RunArgs) -> Result<EtlResult> {
    let config = load_config(args.config.as_deref())?;
    let options = EtlOptions {
        uri: args.source.clone(),
        database: args.database.clone(),
        collections: CollectionNames {
            listings: args.listings.clone(),
            calendar: args.calendar.clone(),
            reviews: args.reviews.clone(),
        },
        config,
        sqlite: (!args.no_sqlite).then(|| SqliteTarget {
            path: args.sqlite_path.clone(),
            table: args.table.clone(),
            mode: match args.mode {
                WriteModeArg::Replace => WriteMode::Replace,
                WriteModeArg::Append => WriteMode::Append,
            },
        }),
        export: (!args.no_export).then(|| ExportTarget {
            base_path: args.export_path.clone(),
            options: ExportOptions::default()
                .with_max_rows_per_file(args.max_rows.unwrap_or(SPREADSHEET_ROW_LIMIT))
                .with_truncate_text((args.truncate_text > 0).then_some(args.truncate_text))
                .with_text_columns(text_columns()),
        }),
    };
    run_etl(&options)
}

pub fn print_config(args: &ConfigArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let text = config.to_toml_string().context("render configuration")?;
    print!("{text}");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::from_toml_path(path)
                .with_context(|| format!("load configuration {}", path.display()))?;
            info!(path = %path.display(), "loaded pipeline configuration");
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}
