//! CSV parsing into Row Store rows

use crate::error::{Error, Result};
use crate::meta::{NewRow, RowData};
use csv::{Reader, ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::io::Read;

/// Open a CSV stream and read its header.
///
/// Blank headers become `col_<i>`; repeated names get a `_<i>` suffix so
/// every column stays addressable. No header at all is [`Error::EmptyInput`].
pub fn open_csv<R: Read>(source: R) -> Result<(Vec<String>, Reader<R>)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);

    let mut header = StringRecord::new();
    if !reader.read_record(&mut header)? || header.is_empty() {
        return Err(Error::EmptyInput);
    }

    Ok((header_columns(&header), reader))
}

fn header_columns(header: &StringRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    header
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let raw = if i == 0 {
                raw.trim_start_matches('\u{feff}')
            } else {
                raw
            };
            let name = match raw.trim() {
                "" => format!("col_{}", i),
                trimmed => trimmed.to_string(),
            };
            if seen.insert(name.clone()) {
                name
            } else {
                let unique = format!("{}_{}", name, i);
                seen.insert(unique.clone());
                unique
            }
        })
        .collect()
}

/// Trimmed cell value; empty becomes null
pub fn normalize_cell(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Flatten non-null cells into `"col: value | col: value"`.
///
/// Parts are added in column order until the running length passes
/// `max_chars`; the part that crosses the budget is kept.
pub fn row_text(columns: &[String], values: &[Option<String>], max_chars: usize) -> String {
    let mut parts = Vec::new();
    let mut total = 0;
    for (column, value) in columns.iter().zip(values) {
        let Some(value) = value else {
            continue;
        };
        let part = format!("{}: {}", column, value);
        total += part.chars().count();
        parts.push(part);
        if total > max_chars {
            break;
        }
    }
    parts.join(" | ")
}

/// Build a row from a record, padding or truncating it to the column count
pub fn build_row(
    columns: &[String],
    record: &StringRecord,
    row_index: i64,
    max_chars: usize,
) -> NewRow {
    let values: Vec<Option<String>> = (0..columns.len())
        .map(|i| normalize_cell(record.get(i)))
        .collect();
    let row_text = row_text(columns, &values, max_chars);
    let data: RowData = columns.iter().cloned().zip(values).collect();

    NewRow {
        row_index,
        data,
        row_text,
    }
}
