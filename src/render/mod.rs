//! Display collaborators: the HTML rate table and the trend chart.

pub mod chart;
pub mod html;

pub use chart::{Chart, ChartRenderer, SvgChartRenderer};
pub use html::html_table;
