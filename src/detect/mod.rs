//! Day-over-day change detection on a `CleanTable`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::table::CleanTable;

pub const DEFAULT_THRESHOLD: f64 = 0.001;

/// Materiality rule for one tenor step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum Threshold {
    /// `|delta| > t * |previous|`. Steps from zero are never reported.
    Relative(f64),
    /// `|delta| > t`, in the rate's own unit.
    Absolute(f64),
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Relative(DEFAULT_THRESHOLD)
    }
}

impl Threshold {
    /// Whether the step `previous → current` is material. `None` when the
    /// step has no defined magnitude under this rule.
    pub fn exceeded(&self, previous: f64, current: f64) -> Option<bool> {
        let delta = current - previous;
        match *self {
            Threshold::Relative(t) => {
                if previous == 0.0 {
                    None
                } else {
                    Some(delta.abs() > t * previous.abs())
                }
            }
            Threshold::Absolute(t) => Some(delta.abs() > t),
        }
    }

    /// Threshold as a percentage label for messages, e.g. `0.1%`.
    pub fn describe(&self) -> String {
        match *self {
            Threshold::Relative(t) => format!("{}%", t * 100.0),
            Threshold::Absolute(t) => format!("{}", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TenorChange {
    pub tenor: String,
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
}

impl TenorChange {
    /// Change relative to the previous value; `None` from zero.
    pub fn relative(&self) -> Option<f64> {
        (self.previous != 0.0).then(|| self.delta / self.previous)
    }
}

/// Tenors whose latest step is material, in vocabulary order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeReport {
    pub changes: Vec<TenorChange>,
}

impl ChangeReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn tenors(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.tenor.as_str()).collect()
    }

    pub fn contains(&self, tenor: &str) -> bool {
        self.changes.iter().any(|c| c.tenor == tenor)
    }
}

pub struct ChangeDetector {
    threshold: Threshold,
}

impl ChangeDetector {
    pub fn new(threshold: Threshold) -> Self {
        Self { threshold }
    }

    pub fn with_defaults() -> Self {
        Self::new(Threshold::default())
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Compare the first two records of `table`.
    ///
    /// The table must be sorted newest first (`table.sorted(SortOrder::Descending)`).
    /// Fewer than two records yields an empty report; tenors missing in either
    /// record are skipped.
    pub fn detect(&self, table: &CleanTable) -> ChangeReport {
        let records = table.records();
        if records.len() < 2 {
            return ChangeReport::default();
        }
        let (current, previous) = (&records[0], &records[1]);

        let mut changes = Vec::new();
        for (i, tenor) in table.tenors().iter().enumerate() {
            let (Some(prev), Some(cur)) = (previous.rates[i], current.rates[i]) else {
                continue;
            };
            if self.threshold.exceeded(prev, cur) == Some(true) {
                changes.push(TenorChange {
                    tenor: tenor.clone(),
                    previous: prev,
                    current: cur,
                    delta: cur - prev,
                });
            }
        }
        debug!(
            current = %current.date,
            previous = %previous.date,
            changed = changes.len(),
            "change detection"
        );
        ChangeReport { changes }
    }
}
