use std::collections::BTreeSet;
use std::io::Write;

use itertools::Itertools;
use polars::prelude::*;

use crate::remote::{FieldValue, RunRow, SYS_ID};

/// Column type inferred from the non-null cells of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
}

/// Build the runs table: `sys/id` first, then the requested columns in
/// order (or every attribute by name). Requested columns that no run
/// carries are left out.
pub fn runs_frame(rows: &[RunRow], columns: Option<&[String]>) -> PolarsResult<DataFrame> {
    let present: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.attributes.keys().map(String::as_str))
        .collect();

    let mut names: Vec<&str> = vec![SYS_ID];
    match columns {
        Some(requested) => names.extend(
            requested
                .iter()
                .map(String::as_str)
                .filter(|c| *c != SYS_ID && present.contains(c))
                .unique(),
        ),
        None => names.extend(present.iter().copied().filter(|c| *c != SYS_ID)),
    }

    let series: Vec<Series> = names
        .iter()
        .map(|name| {
            let cells: Vec<Option<&FieldValue>> = rows.iter().map(|r| r.get(name)).collect();
            field_column(name, &cells)
        })
        .collect();
    DataFrame::new(series)
}

fn field_column(name: &str, cells: &[Option<&FieldValue>]) -> Series {
    match column_kind(cells) {
        ColumnKind::Bool => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|c| match c {
                    Some(FieldValue::Bool(b)) => Some(*b),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
        }
        ColumnKind::Int => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    Some(FieldValue::Int(i)) => Some(*i),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
        }
        ColumnKind::Float => {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|c| match c {
                    Some(FieldValue::Float(f)) => Some(*f),
                    Some(FieldValue::Int(i)) => Some(*i as f64),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
        }
        ColumnKind::Text => {
            let values: Vec<Option<String>> = cells.iter().map(|c| c.and_then(render_text)).collect();
            Series::new(name, values)
        }
    }
}

fn column_kind(cells: &[Option<&FieldValue>]) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for cell in cells.iter().flatten() {
        let this = match cell {
            FieldValue::Null => continue,
            FieldValue::Bool(_) => ColumnKind::Bool,
            FieldValue::Int(_) => ColumnKind::Int,
            FieldValue::Float(_) => ColumnKind::Float,
            FieldValue::Str(_) | FieldValue::StrSet(_) | FieldValue::Datetime(_) => ColumnKind::Text,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int), ColumnKind::Float) | (Some(ColumnKind::Float), ColumnKind::Int) => {
                ColumnKind::Float
            }
            _ => return ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn render_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Str(s) | FieldValue::Datetime(s) => Some(s.clone()),
        FieldValue::Float(f) => Some(f.to_string()),
        FieldValue::Int(i) => Some(i.to_string()),
        FieldValue::Bool(b) => Some(b.to_string()),
        FieldValue::StrSet(vs) => Some(vs.join(",")),
        FieldValue::Null => None,
    }
}

/// Value columns aligned by position; shorter columns are null-padded
pub fn series_frame(columns: Vec<(String, Vec<f64>)>) -> PolarsResult<DataFrame> {
    let height = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    let series: Vec<Series> = columns
        .into_iter()
        .map(|(name, values)| {
            let mut padded: Vec<Option<f64>> = values.into_iter().map(Some).collect();
            padded.resize(height, None);
            Series::new(&name, padded)
        })
        .collect();
    DataFrame::new(series)
}

/// Outer join on row index: every frame is padded to the tallest one and
/// the columns are stacked side by side
pub fn join_on_index(frames: Vec<DataFrame>) -> PolarsResult<DataFrame> {
    let height = frames.iter().map(DataFrame::height).max().unwrap_or(0);
    let mut columns = Vec::new();
    for frame in &frames {
        for s in frame.get_columns() {
            columns.push(pad_series(s, height)?);
        }
    }
    DataFrame::new(columns)
}

fn pad_series(s: &Series, height: usize) -> PolarsResult<Series> {
    if s.len() >= height {
        return Ok(s.clone());
    }
    s.extend_constant(AnyValue::Null, height - s.len())
}

/// Run identifiers from the `sys/id` column, in table order
pub fn run_ids(frame: &DataFrame) -> PolarsResult<Vec<String>> {
    Ok(frame
        .column(SYS_ID)?
        .utf8()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect())
}

/// Write a table as CSV with a header row
pub fn write_csv<W: Write>(frame: &mut DataFrame, writer: W) -> PolarsResult<()> {
    CsvWriter::new(writer).has_header(true).finish(frame)
}
