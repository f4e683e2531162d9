use crate::joiner::LookupFailures;
use crate::models::ExportRow;
use crate::pipeline;
use crate::range::DateRange;
use crate::resolver::SessionResolver;
use crate::store::{ExportStore, StoreResult};
use tabled::{Table, settings::Style};

/// Renders export rows as a terminal table.
pub fn render_rows(rows: &[ExportRow]) -> String {
    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.to_string()
}

/// Pretty prints the first `limit` rows of the report for `range`.
pub fn show_preview<S: ExportStore + ?Sized>(
    store: &S,
    range: &DateRange,
    limit: usize,
) -> StoreResult<()> {
    let resolver = SessionResolver::new(store);
    let rows = pipeline::rows(&resolver, store, range, LookupFailures::default())
        .take(limit)
        .collect::<StoreResult<Vec<_>>>()?;

    if rows.is_empty() {
        println!("No sessions between {} and {}.", range.start(), range.end());
        return Ok(());
    }

    println!("Attendance {range} (first {}):\n{}", rows.len(), render_rows(&rows));
    Ok(())
}
