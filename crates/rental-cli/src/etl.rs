//! End-to-end run: extract the snapshot, build the flat sheet, load it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use rental_ingest::SnapshotStore;
use rental_model::{ColumnRole, TableKind, TableSchema};
use rental_output::{OutputError, SqliteSink, WriteMode, export};
use rental_transform::{BuildStatus, Snapshot, TransformPipeline};
use tracing::{info, info_span, warn};

use crate::types::{EtlOptions, EtlResult, SourceCount, SqliteOutcome};

pub fn run_etl(options: &EtlOptions) -> Result<EtlResult> {
    let run_span = info_span!("etl", database = %options.database);
    let _run_guard = run_span.enter();
    let started = Instant::now();

    // =========================================================================
    // Extract
    // =========================================================================
    let (snapshot, sources) = info_span!("extract", uri = %options.uri)
        .in_scope(|| extract(options))?;

    // =========================================================================
    // Transform
    // =========================================================================
    let pipeline = TransformPipeline::standard(Arc::new(options.config.clone()));
    let output = pipeline.run(&snapshot).context("transform snapshot")?;
    let flat = output.flat_sheet;
    info!(
        rows = flat.frame.height(),
        columns = flat.frame.width(),
        "flat sheet ready"
    );

    let mut result = EtlResult {
        sources,
        flat_rows: flat.frame.height(),
        flat_columns: flat.frame.width(),
        unjoined_reason: None,
        executed_stages: output.executed_stages,
        audit: output.audit,
        sqlite: None,
        export: None,
    };
    if let BuildStatus::Unjoined { reason } = flat.status {
        warn!(%reason, "calendar was not joined; skipping load");
        result.unjoined_reason = Some(reason);
        return Ok(result);
    }

    // =========================================================================
    // Load
    // =========================================================================
    let load_span = info_span!("load");
    let _load_guard = load_span.enter();
    if let Some(target) = &options.sqlite {
        let mut sink = SqliteSink::open(&target.path)
            .with_context(|| format!("open sqlite database {}", target.path.display()))?;
        let before = match target.mode {
            WriteMode::Replace => 0,
            WriteMode::Append => sink
                .existing_rows(&target.table)
                .with_context(|| format!("count rows in table {}", target.table))?,
        };
        let written = sink
            .insert(&flat.frame, &target.table, target.mode)
            .with_context(|| format!("insert into table {}", target.table))?;
        let expected = before + written;
        let stored = match sink.verify_count(&target.table, expected) {
            Ok(stored) => stored,
            // already logged as a warning by the sink
            Err(OutputError::Verification { found, .. }) => found,
            Err(error) => {
                return Err(error).with_context(|| format!("verify table {}", target.table));
            }
        };
        result.sqlite = Some(SqliteOutcome {
            path: target.path.clone(),
            table: target.table.clone(),
            written,
            expected,
            stored,
        });
    }
    if let Some(target) = &options.export {
        let summary = export(&flat.frame, &target.base_path, &target.options)
            .with_context(|| format!("export to {}", target.base_path.display()))?;
        result.export = Some(summary);
    }

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "etl finished"
    );
    Ok(result)
}

/// Free-text columns of all three sources, the only cells the export truncates.
pub fn text_columns() -> BTreeSet<String> {
    [TableKind::Listings, TableKind::Calendar, TableKind::Reviews]
        .into_iter()
        .flat_map(|kind| {
            TableSchema::for_kind(kind)
                .names_with_role(ColumnRole::Text)
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn extract(options: &EtlOptions) -> Result<(Snapshot, Vec<SourceCount>)> {
    let store = SnapshotStore::connect(&options.uri, &options.database)
        .with_context(|| format!("connect to {}", options.uri))?;
    let names = &options.collections;
    let mut sources = Vec::with_capacity(3);
    let listings = fetch_counted(&store, &names.listings, &mut sources)?;
    let calendar = fetch_counted(&store, &names.calendar, &mut sources)?;
    let reviews = fetch_counted(&store, &names.reviews, &mut sources)?;
    store.disconnect();
    Ok((Snapshot::new(listings, calendar, reviews), sources))
}

fn fetch_counted(
    store: &SnapshotStore,
    collection: &str,
    sources: &mut Vec<SourceCount>,
) -> Result<DataFrame> {
    let df = store
        .fetch(collection)
        .with_context(|| format!("fetch collection {collection}"))?;
    info!(collection, rows = df.height(), "source rows");
    sources.push(SourceCount {
        collection: collection.to_string(),
        rows: df.height(),
    });
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_columns_exclude_keys_and_dates() {
        let columns = text_columns();
        assert!(columns.contains("description"));
        assert!(columns.contains("comments"));
        for column in ["id", "listing_id", "date", "price", "first_review"] {
            assert!(!columns.contains(column), "{column} must not be truncated");
        }
    }
}
