use crate::process::utils::Value;

/// One table as returned by document extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTableFragment {
    /// Rows in extraction order. Cells may hold several stacked values separated
    /// by the stacking delimiter, and rows need not share a column count.
    pub rows: Vec<Vec<String>>,
}

impl RawTableFragment {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Column count of the fragment: the longest row wins.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// One raw row after splitting each cell on the stacking delimiter.
///
/// Every entry of `cells` has exactly `width` values; `counts` keeps the number
/// of sub-values each cell held before padding (0 for an empty cell).
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub width: usize,
    pub cells: Vec<Vec<Value>>,
    pub counts: Vec<usize>,
}

impl NormalizedRow {
    /// Values of sub-row `i`, one per column.
    pub fn sub_row(&self, i: usize) -> impl Iterator<Item = &Value> + '_ {
        self.cells.iter().map(move |c| &c[i])
    }
}
