use chrono::NaiveDate;

const SEPARATED_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d", "%Y.%m.%d"];

/// Parse a calendar date out of a table cell.
///
/// Accepts `YYYY/MM/DD`, `YYYY-MM-DD`, `YYYY.MM.DD`, `YYYYMMDD` and `YYMMDD`,
/// optionally followed by a time component, which is ignored.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date_part = s.split(|c: char| c.is_whitespace() || c == 'T').next()?;

    for fmt in SEPARATED_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(date_part, fmt) {
            return Some(d);
        }
    }

    if !date_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match date_part.len() {
        8 => {
            let year: i32 = date_part[0..4].parse().ok()?;
            let month: u32 = date_part[4..6].parse().ok()?;
            let day: u32 = date_part[6..8].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        6 => {
            let year: i32 = date_part[0..2].parse().ok()?;
            let month: u32 = date_part[2..4].parse().ok()?;
            let day: u32 = date_part[4..6].parse().ok()?;
            NaiveDate::from_ymd_opt(2000 + year, month, day)
        }
        _ => None,
    }
}

/// `YYMMDD`, the stamp used in published document names.
pub fn yymmdd(date: NaiveDate) -> String {
    date.format("%y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_separated_dates() {
        assert_eq!(parse_date("2024/04/01"), Some(ymd(2024, 4, 1)));
        assert_eq!(parse_date(" 2024-04-02 "), Some(ymd(2024, 4, 2)));
        assert_eq!(parse_date("2024.04.03"), Some(ymd(2024, 4, 3)));
        assert_eq!(parse_date("2024/04/01 00:00:00"), Some(ymd(2024, 4, 1)));
        assert_eq!(parse_date("2024-04-01T09:00:00"), Some(ymd(2024, 4, 1)));
    }

    #[test]
    fn parses_compact_dates() {
        assert_eq!(parse_date("20250924"), Some(ymd(2025, 9, 24)));
        assert_eq!(parse_date("250924"), Some(ymd(2025, 9, 24)));
        assert_eq!(yymmdd(ymd(2025, 9, 24)), "250924");
    }

    #[test]
    fn rejects_non_dates() {
        assert_eq!(parse_date("0.065"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2024/13/01"), None);
        assert_eq!(parse_date("1WEEK"), None);
    }
}
