// src/process/split.rs
use crate::process::raw_table::NormalizedRow;
use crate::process::utils::{parse_value, split_cell, Value};

/// Unstack one raw row.
///
/// Each cell is split on `delimiter` and parsed; the row's width is the
/// largest sub-value count of any cell, and every cell is right-padded with
/// `Value::Missing` up to that width. A row of blank cells still has width 1.
pub fn split_row<S: AsRef<str>>(cells: &[S], delimiter: char) -> NormalizedRow {
    let mut split: Vec<Vec<Value>> = Vec::with_capacity(cells.len());
    let mut counts = Vec::with_capacity(cells.len());

    for cell in cells {
        let values: Vec<Value> = split_cell(cell.as_ref(), delimiter)
            .into_iter()
            .map(parse_value)
            .collect();
        counts.push(values.len());
        split.push(values);
    }

    let width = counts.iter().copied().max().unwrap_or(0).max(1);
    for values in split.iter_mut() {
        values.resize(width, Value::Missing);
    }

    NormalizedRow {
        width,
        cells: split,
        counts,
    }
}
