/// A scalar pulled out of one (sub-)cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Missing,
    /// Text that is not a number; this is how date cells survive the split.
    Raw(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

/// Trim whitespace and strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Split one cell on the stacking delimiter.
///
/// Interior blank pieces stay in place as `""` so later values keep their
/// sub-row position; only trailing blank pieces are dropped. An entirely blank
/// cell yields an empty vector.
pub fn split_cell(raw: &str, delimiter: char) -> Vec<&str> {
    let mut pieces: Vec<&str> = raw.split(delimiter).map(clean_str).collect();
    while pieces.last().is_some_and(|p| p.is_empty()) {
        pieces.pop();
    }
    pieces
}

/// Parse one sub-value: strip a trailing percent sign, then try `f64`.
pub fn parse_value(raw: &str) -> Value {
    let s = clean_str(raw);
    if s.is_empty() {
        return Value::Missing;
    }
    let numeric = s.strip_suffix('%').map(str::trim_end).unwrap_or(s);
    match numeric.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Raw(s.to_string()),
    }
}

/// Canonical form of a column label for header matching: upper case, no whitespace.
pub fn label_key(raw: &str) -> String {
    clean_str(raw)
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}
