use askama::Template;

use crate::table::{CleanTable, SortOrder};

#[derive(Template)]
#[template(path = "rate_table.html")]
struct RateTableTemplate<'a> {
    tenors: &'a [String],
    rows: Vec<Vec<String>>,
}

/// Render the table newest first; missing rates are left blank.
pub fn html_table(table: &CleanTable) -> askama::Result<String> {
    let sorted = table.sorted(SortOrder::Descending);
    RateTableTemplate {
        tenors: sorted.tenors(),
        rows: sorted.display_rows(4),
    }
    .render()
}
