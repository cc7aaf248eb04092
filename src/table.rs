// src/table.rs

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::error::NormalizeError;

/// One observation date with a rate per tenor, aligned with the owning
/// table's tenor vocabulary. `None` is an explicit missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct TenorRecord {
    pub date: NaiveDate,
    pub rates: Vec<Option<f64>>,
}

impl TenorRecord {
    pub fn new(date: NaiveDate, rates: Vec<Option<f64>>) -> Self {
        Self { date, rates }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Date-indexed rate table with a fixed tenor column set.
///
/// Invariants, enforced by every constructor:
/// - every record carries exactly one rate slot per tenor;
/// - no two records share a date (a later record replaces an earlier one).
#[derive(Debug, Clone, PartialEq)]
pub struct CleanTable {
    tenors: Vec<String>,
    records: Vec<TenorRecord>,
}

impl CleanTable {
    pub fn new(tenors: Vec<String>, records: Vec<TenorRecord>) -> Result<Self, NormalizeError> {
        if let Some(bad) = records.iter().find(|r| r.rates.len() != tenors.len()) {
            return Err(NormalizeError::SchemaMismatch {
                context: format!("record dated {}", bad.date),
                expected: tenors.len(),
                found: bad.rates.len(),
            });
        }
        Ok(Self {
            tenors,
            records: dedup_by_date(records),
        })
    }

    pub fn empty(tenors: Vec<String>) -> Self {
        Self {
            tenors,
            records: Vec::new(),
        }
    }

    pub fn tenors(&self) -> &[String] {
        &self.tenors
    }

    pub fn records(&self) -> &[TenorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn tenor_index(&self, tenor: &str) -> Option<usize> {
        self.tenors.iter().position(|t| t == tenor)
    }

    /// Rate of `tenor` in `record`; `None` when missing or the tenor is unknown.
    pub fn rate(&self, record: &TenorRecord, tenor: &str) -> Option<f64> {
        self.tenor_index(tenor)
            .and_then(|i| record.rates.get(i).copied().flatten())
    }

    pub fn get(&self, date: NaiveDate) -> Option<&TenorRecord> {
        self.records.iter().find(|r| r.date == date)
    }

    /// Record with the greatest date.
    pub fn latest(&self) -> Option<&TenorRecord> {
        self.records.iter().max_by_key(|r| r.date)
    }

    /// A new table with the records sorted by date.
    pub fn sorted(&self, order: SortOrder) -> CleanTable {
        let mut records = self.records.clone();
        match order {
            SortOrder::Ascending => records.sort_by_key(|r| r.date),
            SortOrder::Descending => records.sort_by(|a, b| b.date.cmp(&a.date)),
        }
        CleanTable {
            tenors: self.tenors.clone(),
            records,
        }
    }

    /// Combine a stored table with the current run's table into a new one.
    ///
    /// Neither input is modified. Where both hold the same date the current
    /// run's record wins. The result is sorted ascending by date.
    pub fn merge(history: &CleanTable, current: &CleanTable) -> Result<CleanTable, NormalizeError> {
        if history.tenors != current.tenors {
            return Err(NormalizeError::SchemaMismatch {
                context: "history merge".to_string(),
                expected: current.tenors.len(),
                found: history.tenors.len(),
            });
        }
        let records = history
            .records
            .iter()
            .chain(current.records.iter())
            .cloned()
            .collect();
        Ok(CleanTable {
            tenors: current.tenors.clone(),
            records: dedup_by_date(records),
        }
        .sorted(SortOrder::Ascending))
    }

    /// Numeric view with missing rates filled with zero.
    pub fn zero_filled(&self) -> Vec<(NaiveDate, Vec<f64>)> {
        self.records
            .iter()
            .map(|r| (r.date, r.rates.iter().map(|v| v.unwrap_or(0.0)).collect()))
            .collect()
    }

    /// Display view: dates as `YYYY-MM-DD`, missing rates as empty strings.
    pub fn display_rows(&self, precision: usize) -> Vec<Vec<String>> {
        self.records
            .iter()
            .map(|r| {
                let mut row = Vec::with_capacity(r.rates.len() + 1);
                row.push(r.date.format("%Y-%m-%d").to_string());
                row.extend(r.rates.iter().map(|v| match v {
                    Some(x) => format!("{:.*}", precision, x),
                    None => String::new(),
                }));
                row
            })
            .collect()
    }
}

/// Keep one record per date. A repeated date overwrites the earlier record in
/// the earlier record's position.
fn dedup_by_date(records: Vec<TenorRecord>) -> Vec<TenorRecord> {
    let mut out: Vec<TenorRecord> = Vec::with_capacity(records.len());
    let mut seen: HashMap<NaiveDate, usize> = HashMap::new();
    for rec in records {
        match seen.get(&rec.date) {
            Some(&i) => out[i] = rec,
            None => {
                seen.insert(rec.date, out.len());
                out.push(rec);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    fn tenors() -> Vec<String> {
        vec!["1WEEK".to_string(), "1MONTH".to_string()]
    }

    #[test]
    fn rejects_records_with_wrong_slot_count() {
        let err = CleanTable::new(tenors(), vec![TenorRecord::new(d(1), vec![Some(0.1)])])
            .unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::SchemaMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn later_duplicate_date_wins() {
        let table = CleanTable::new(
            tenors(),
            vec![
                TenorRecord::new(d(1), vec![Some(0.1), Some(0.2)]),
                TenorRecord::new(d(2), vec![Some(0.3), None]),
                TenorRecord::new(d(1), vec![Some(0.5), Some(0.6)]),
            ],
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[0].date, d(1));
        assert_eq!(table.rate(&table.records()[0], "1WEEK"), Some(0.5));
        assert_eq!(table.rate(&table.records()[1], "1MONTH"), None);
    }

    #[test]
    fn merge_prefers_current_and_leaves_inputs_alone() {
        let history = CleanTable::new(
            tenors(),
            vec![
                TenorRecord::new(d(2), vec![Some(0.2), Some(0.2)]),
                TenorRecord::new(d(1), vec![Some(0.1), Some(0.1)]),
            ],
        )
        .unwrap();
        let current = CleanTable::new(
            tenors(),
            vec![
                TenorRecord::new(d(2), vec![Some(0.25), None]),
                TenorRecord::new(d(3), vec![Some(0.3), Some(0.3)]),
            ],
        )
        .unwrap();
        let history_before = history.clone();

        let merged = CleanTable::merge(&history, &current).unwrap();
        let dates: Vec<_> = merged.records().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(1), d(2), d(3)]);
        assert_eq!(merged.get(d(2)).unwrap().rates, vec![Some(0.25), None]);
        assert_eq!(history, history_before);
    }

    #[test]
    fn merge_requires_same_vocabulary() {
        let history = CleanTable::empty(vec!["1WEEK".to_string()]);
        let current = CleanTable::empty(tenors());
        assert!(CleanTable::merge(&history, &current).is_err());
    }

    #[test]
    fn views_fill_missing_differently() {
        let table = CleanTable::new(
            tenors(),
            vec![TenorRecord::new(d(1), vec![Some(0.065), None])],
        )
        .unwrap();
        assert_eq!(table.zero_filled(), vec![(d(1), vec![0.065, 0.0])]);
        assert_eq!(
            table.display_rows(4),
            vec![vec![
                "2024-04-01".to_string(),
                "0.0650".to_string(),
                String::new()
            ]]
        );
    }

    #[test]
    fn sorted_returns_new_table() {
        let table = CleanTable::new(
            tenors(),
            vec![
                TenorRecord::new(d(1), vec![None, None]),
                TenorRecord::new(d(3), vec![None, None]),
                TenorRecord::new(d(2), vec![None, None]),
            ],
        )
        .unwrap();
        let desc = table.sorted(SortOrder::Descending);
        let dates: Vec<_> = desc.records().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(3), d(2), d(1)]);
        assert_eq!(table.records()[0].date, d(1));
        assert_eq!(table.latest().unwrap().date, d(3));
    }

    #[test]
    fn rate_tolerates_a_foreign_record() {
        let table = CleanTable::new(tenors(), vec![TenorRecord::new(d(1), vec![Some(0.1), Some(0.2)])])
            .unwrap();
        assert_eq!(table.rate(&table.records()[0], "1MONTH"), Some(0.2));
        let short = TenorRecord::new(d(2), vec![Some(0.3)]);
        assert_eq!(table.rate(&short, "1MONTH"), None);
        assert_eq!(table.rate(&short, "1WEEK"), Some(0.3));
        assert_eq!(table.rate(&short, "9MONTH"), None);
    }
}
