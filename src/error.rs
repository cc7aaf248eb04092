// src/error.rs

use std::fmt;
use thiserror::Error;

/// Failures raised by the table normalizer and the table model.
///
/// `EmptyInput` is a soft condition: the driver treats it as "nothing published
/// today" and skips notification instead of alerting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("schema mismatch in {context}: expected {expected} columns, found {found}")]
    SchemaMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("cannot derive dates: {0}")]
    DateDerivation(String),

    #[error("no data rows found after header removal")]
    EmptyInput,
}

impl NormalizeError {
    pub fn is_empty_input(&self) -> bool {
        matches!(self, NormalizeError::EmptyInput)
    }
}

/// A single cell that could not be read as a number (or a date, for the date
/// column). The cell is kept as missing and processing continues.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueParseWarning {
    /// Index of the raw data row, counted across all fragments after header removal.
    pub row: usize,
    /// Index of the sub-row within the stacked raw row.
    pub sub_row: usize,
    pub column: String,
    pub text: String,
}

impl fmt::Display for ValueParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} sub-row {} column {}: unparseable value {:?}",
            self.row, self.sub_row, self.column, self.text
        )
    }
}
