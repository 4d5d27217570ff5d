use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use rental_cli::types::EtlResult;

pub fn print_summary(result: &EtlResult) {
    let mut sources = Table::new();
    sources.set_header(vec![header_cell("Collection"), header_cell("Rows")]);
    apply_table_style(&mut sources);
    align_column(&mut sources, 1, CellAlignment::Right);
    for source in &result.sources {
        sources.add_row(vec![Cell::new(&source.collection), Cell::new(source.rows)]);
    }
    println!("{sources}");

    println!(
        "Flat sheet: {} rows x {} columns (stages: {})",
        result.flat_rows,
        result.flat_columns,
        result.executed_stages.join(" -> ")
    );
    print_audit_table(result);

    if let Some(sqlite) = &result.sqlite {
        let status = if sqlite.verified() {
            "verified"
        } else {
            "COUNT MISMATCH"
        };
        println!(
            "SQLite: {} [{}] {} written, {} stored of {} expected ({status})",
            sqlite.path.display(),
            sqlite.table,
            sqlite.written,
            sqlite.stored,
            sqlite.expected
        );
    }
    if let Some(export) = &result.export {
        println!(
            "Export: {} rows in {} file(s), {} cell(s) truncated",
            export.rows,
            export.files.len(),
            export.truncated_cells
        );
        for path in &export.files {
            println!("  {}", path.display());
        }
    }
    if let Some(reason) = &result.unjoined_reason {
        eprintln!("Errors:");
        eprintln!("- flat sheet not produced: {reason}");
    }
}

fn print_audit_table(result: &EtlResult) {
    let mut rows: Vec<_> = result.audit.non_zero().collect();
    if rows.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        (&a.stage, &a.table, &a.column).cmp(&(&b.stage, &b.table, &b.column))
    });
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Stage"),
        header_cell("Table"),
        header_cell("Column"),
        header_cell("Step"),
        header_cell("Count"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 4, CellAlignment::Right);
    let mut total = 0usize;
    for record in rows {
        total += record.count;
        table.add_row(vec![
            dim_cell(&record.stage),
            Cell::new(&record.table),
            Cell::new(&record.column).fg(Color::Blue),
            step_cell(&record.step),
            Cell::new(record.count),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
        dim_cell("-"),
        Cell::new(total).add_attribute(Attribute::Bold),
    ]);
    println!();
    println!("Imputation:");
    println!("{table}");
}

fn step_cell(step: &str) -> Cell {
    match step {
        "dropped" | "duplicate" => Cell::new(step).fg(Color::Red),
        "default" | "fallback" | "guarantee" | "safety_net" | "sentinel" => {
            Cell::new(step).fg(Color::Yellow)
        }
        _ => Cell::new(step),
    }
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
