// src/process/normalize.rs
use chrono::{Duration, NaiveDate};
use tracing::{debug, instrument, warn};

use crate::error::{NormalizeError, ValueParseWarning};
use crate::process::date_parser::parse_date;
use crate::process::raw_table::{NormalizedRow, RawTableFragment};
use crate::process::split::split_row;
use crate::process::utils::{label_key, parse_value, split_cell, Value};
use crate::table::{CleanTable, TenorRecord};

/// Where each unstacked sub-row gets its calendar date from.
#[derive(Debug, Clone, PartialEq)]
pub enum DateSource {
    /// A leading date column in the table itself.
    Column,
    /// Date strings from a separate extraction pass, one per sub-row, in order.
    Explicit(Vec<String>),
    /// The last sub-row is `published`; earlier sub-rows step back one day each.
    Derived { published: NaiveDate },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    /// Separator used by the source document to stack several days into one cell.
    pub delimiter: char,
    pub dates: DateSource,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            delimiter: '\r',
            dates: DateSource::Column,
        }
    }
}

/// Normalizer output: the table plus every cell that was dropped as unparseable.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub table: CleanTable,
    pub warnings: Vec<ValueParseWarning>,
}

/// A data row that survived header removal, padded to its fragment's width.
struct DataRow<'a> {
    cells: Vec<&'a str>,
    has_date: bool,
}

struct SubRow {
    row: usize,
    sub: usize,
    date_text: Option<String>,
    values: Vec<Value>,
}

/// Turns raw extracted fragments into a `CleanTable` for a fixed tenor vocabulary.
pub struct Normalizer {
    vocabulary: Vec<String>,
    keys: Vec<String>,
    options: NormalizeOptions,
}

impl Normalizer {
    pub fn new(vocabulary: Vec<String>, options: NormalizeOptions) -> Self {
        let keys = vocabulary.iter().map(|l| label_key(l)).collect();
        Self {
            vocabulary,
            keys,
            options,
        }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    #[instrument(level = "debug", skip_all, fields(fragments = fragments.len()))]
    pub fn normalize(&self, fragments: &[RawTableFragment]) -> Result<Normalized, NormalizeError> {
        // ─── 1) concatenate fragments, drop headers ─────────────────────
        let mut warnings = Vec::new();
        let rows = self.collect_data_rows(fragments, &mut warnings)?;
        if rows.is_empty() {
            return Err(NormalizeError::EmptyInput);
        }
        debug!(rows = rows.len(), "data rows after header removal");

        // ─── 2-4) unstack every row ──────────────────────────────────────
        let mut sub_rows = Vec::new();
        for (row_idx, row) in rows.iter().enumerate() {
            let split = split_row(&row.cells, self.options.delimiter);
            let offset = usize::from(row.has_date);
            if matches!(self.options.dates, DateSource::Derived { .. }) {
                check_stacking(row_idx, &split, offset)?;
            }
            let date_texts: Vec<&str> = if row.has_date {
                split_cell(row.cells[0], self.options.delimiter)
            } else {
                Vec::new()
            };
            for sub in 0..split.width {
                sub_rows.push(SubRow {
                    row: row_idx,
                    sub,
                    date_text: date_texts.get(sub).map(|s| s.to_string()),
                    values: split.cells[offset..].iter().map(|c| c[sub].clone()).collect(),
                });
            }
        }

        // ─── 5) assign dates ─────────────────────────────────────────────
        let dated = self.assign_dates(sub_rows, &mut warnings)?;

        // ─── 6) assemble ─────────────────────────────────────────────────
        let mut records = Vec::with_capacity(dated.len());
        for (date, sub) in dated {
            let rates = sub
                .values
                .into_iter()
                .zip(&self.vocabulary)
                .map(|(value, tenor)| match value {
                    Value::Number(n) => Some(n),
                    Value::Missing => None,
                    Value::Raw(text) => {
                        let w = ValueParseWarning {
                            row: sub.row,
                            sub_row: sub.sub,
                            column: tenor.clone(),
                            text,
                        };
                        warn!(%w, "keeping cell as missing");
                        warnings.push(w);
                        None
                    }
                })
                .collect();
            records.push(TenorRecord::new(date, rates));
        }
        if records.is_empty() {
            return Err(NormalizeError::EmptyInput);
        }

        let table = CleanTable::new(self.vocabulary.clone(), records)?;
        debug!(records = table.len(), warnings = warnings.len(), "normalized");
        Ok(Normalized { table, warnings })
    }

    fn collect_data_rows<'a>(
        &self,
        fragments: &'a [RawTableFragment],
        warnings: &mut Vec<ValueParseWarning>,
    ) -> Result<Vec<DataRow<'a>>, NormalizeError> {
        let n = self.vocabulary.len();
        let mut out = Vec::new();

        for (idx, fragment) in fragments.iter().enumerate() {
            let width = fragment.width();
            if width == 0 {
                continue;
            }
            let has_date = match (width, &self.options.dates) {
                (w, DateSource::Column) if w == n + 1 => true,
                (_, DateSource::Column) => {
                    return Err(NormalizeError::SchemaMismatch {
                        context: format!("fragment {} (date column required)", idx),
                        expected: n + 1,
                        found: width,
                    })
                }
                (w, _) if w == n => false,
                (w, _) if w == n + 1 => true,
                _ => {
                    return Err(NormalizeError::SchemaMismatch {
                        context: format!("fragment {}", idx),
                        expected: n,
                        found: width,
                    })
                }
            };

            for raw in &fragment.rows {
                let mut cells: Vec<&str> = raw.iter().map(String::as_str).collect();
                cells.resize(width, "");
                let offset = usize::from(has_date);
                if self.is_header(&cells[offset..]) {
                    debug!(fragment = idx, "dropping header row");
                    continue;
                }
                if !has_numeric_tenor(&cells[offset..], self.options.delimiter) {
                    let date_text = if has_date { cells[0].trim() } else { "" };
                    if date_text.is_empty() {
                        debug!(fragment = idx, ?cells, "dropping row without rate values");
                    } else {
                        let w = ValueParseWarning {
                            row: out.len(),
                            sub_row: 0,
                            column: "date".to_string(),
                            text: date_text.to_string(),
                        };
                        warn!(%w, "dropping dated row without rate values");
                        warnings.push(w);
                    }
                    continue;
                }
                out.push(DataRow { cells, has_date });
            }
        }
        Ok(out)
    }

    fn is_header(&self, tenor_cells: &[&str]) -> bool {
        tenor_cells.len() == self.keys.len()
            && tenor_cells
                .iter()
                .zip(&self.keys)
                .all(|(cell, key)| label_key(cell) == *key)
    }

    fn assign_dates(
        &self,
        sub_rows: Vec<SubRow>,
        warnings: &mut Vec<ValueParseWarning>,
    ) -> Result<Vec<(NaiveDate, SubRow)>, NormalizeError> {
        match &self.options.dates {
            DateSource::Column => {
                let mut out = Vec::with_capacity(sub_rows.len());
                for sub in sub_rows {
                    match sub.date_text.as_deref().and_then(parse_date) {
                        Some(date) => out.push((date, sub)),
                        None => {
                            let w = ValueParseWarning {
                                row: sub.row,
                                sub_row: sub.sub,
                                column: "date".to_string(),
                                text: sub.date_text.clone().unwrap_or_default(),
                            };
                            warn!(%w, "dropping sub-row without a valid date");
                            warnings.push(w);
                        }
                    }
                }
                Ok(out)
            }
            DateSource::Explicit(dates) => {
                if dates.len() != sub_rows.len() {
                    return Err(NormalizeError::DateDerivation(format!(
                        "{} explicit dates for {} sub-rows",
                        dates.len(),
                        sub_rows.len()
                    )));
                }
                dates
                    .iter()
                    .zip(sub_rows)
                    .map(|(text, sub)| {
                        parse_date(text).map(|d| (d, sub)).ok_or_else(|| {
                            NormalizeError::DateDerivation(format!(
                                "unparseable explicit date {:?}",
                                text
                            ))
                        })
                    })
                    .collect()
            }
            DateSource::Derived { published } => {
                let last = sub_rows.len().saturating_sub(1);
                Ok(sub_rows
                    .into_iter()
                    .enumerate()
                    .map(|(i, sub)| (*published - Duration::days((last - i) as i64), sub))
                    .collect())
            }
        }
    }
}

/// Any tenor cell holding at least one numeric sub-value.
fn has_numeric_tenor(tenor_cells: &[&str], delimiter: char) -> bool {
    tenor_cells.iter().any(|cell| {
        split_cell(cell, delimiter)
            .into_iter()
            .any(|piece| parse_value(piece).as_number().is_some())
    })
}

/// Derived dates only make sense when every populated tenor cell in the row
/// stacks the same number of days.
fn check_stacking(row_idx: usize, split: &NormalizedRow, offset: usize) -> Result<(), NormalizeError> {
    let mut populated = split.counts[offset..].iter().filter(|&&c| c > 0);
    if let Some(&first) = populated.next() {
        if let Some(&other) = populated.find(|&&c| c != first) {
            return Err(NormalizeError::DateDerivation(format!(
                "row {} stacks {} values in one tenor and {} in another",
                row_idx, first, other
            )));
        }
    }
    Ok(())
}
