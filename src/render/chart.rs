// src/render/chart.rs

use askama::{Html, MarkupDisplay};
use std::fmt::Write as _;

use crate::detect::Threshold;
use crate::table::{CleanTable, SortOrder};

/// A rendered chart image.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub trait ChartRenderer: Send + Sync {
    /// `None` when the table has nothing worth plotting.
    fn render(&self, table: &CleanTable, threshold: Threshold) -> Option<Chart>;
}

const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Line chart of every tenor over time, as SVG. Steps that pass the
/// threshold are marked with an arrow and the percentage change.
#[derive(Debug, Clone)]
pub struct SvgChartRenderer {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub min_points: usize,
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self {
            title: "Japanese Yen TIBOR Rates (Daily Changes)".to_string(),
            width: 1200,
            height: 600,
            min_points: 2,
        }
    }
}

struct Plot {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
    y_min: f64,
    y_max: f64,
    x_span: f64,
}

impl Plot {
    fn x(&self, day: f64) -> f64 {
        self.left + (self.right - self.left) * day / self.x_span
    }

    fn y(&self, v: f64) -> f64 {
        self.bottom - (self.bottom - self.top) * (v - self.y_min) / (self.y_max - self.y_min)
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn render(&self, table: &CleanTable, threshold: Threshold) -> Option<Chart> {
        if table.len() < self.min_points.max(2) {
            return None;
        }
        let sorted = table.sorted(SortOrder::Ascending);
        let numeric = sorted.zero_filled();
        let columns: Vec<usize> = (0..sorted.tenors().len())
            .filter(|&i| numeric.iter().any(|(_, v)| v[i] != 0.0))
            .collect();
        if columns.is_empty() {
            return None;
        }

        let first = numeric[0].0;
        let days: Vec<f64> = numeric
            .iter()
            .map(|(d, _)| (*d - first).num_days() as f64)
            .collect();
        let (mut lo, mut hi) = (f64::MAX, f64::MIN);
        for (_, values) in &numeric {
            for &i in &columns {
                lo = lo.min(values[i]);
                hi = hi.max(values[i]);
            }
        }
        let pad = ((hi - lo) * 0.1).max(0.001);
        let plot = Plot {
            left: 80.0,
            right: self.width as f64 - 180.0,
            top: 60.0,
            bottom: self.height as f64 - 110.0,
            y_min: lo - pad,
            y_max: hi + pad,
            x_span: days.last().copied().unwrap_or(1.0).max(1.0),
        };

        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
            w = self.width,
            h = self.height
        );
        let _ = write!(
            svg,
            r#"<rect width="100%" height="100%" fill="white"/><text x="{}" y="30" font-size="18" text-anchor="middle">{}</text>"#,
            self.width / 2,
            MarkupDisplay::new_unsafe(&self.title, Html)
        );
        self.axes(&mut svg, &plot, &sorted, &days);

        for (series, &i) in columns.iter().enumerate() {
            let color = PALETTE[series % PALETTE.len()];
            let points: Vec<String> = numeric
                .iter()
                .zip(&days)
                .map(|((_, v), &day)| format!("{:.1},{:.1}", plot.x(day), plot.y(v[i])))
                .collect();
            let _ = write!(
                svg,
                r#"<polyline fill="none" stroke="{}" stroke-width="1.5" points="{}"/>"#,
                color,
                points.join(" ")
            );
            for ((_, v), &day) in numeric.iter().zip(&days) {
                let _ = write!(
                    svg,
                    r#"<circle cx="{:.1}" cy="{:.1}" r="3" fill="{}"/>"#,
                    plot.x(day),
                    plot.y(v[i]),
                    color
                );
            }

            // annotate material steps on the raw values, never across a gap
            let records = sorted.records();
            for k in 1..records.len() {
                let (Some(prev), Some(cur)) = (records[k - 1].rates[i], records[k].rates[i])
                else {
                    continue;
                };
                if threshold.exceeded(prev, cur) != Some(true) {
                    continue;
                }
                let delta = cur - prev;
                let (arrow, fill, dy) = if delta > 0.0 {
                    ("↑", "#d62728", -15.0)
                } else {
                    ("↓", "#1f77b4", 22.0)
                };
                let label = if prev != 0.0 {
                    format!("{}{:.2}%", arrow, (delta / prev * 100.0).abs())
                } else {
                    format!("{}{:.4}", arrow, delta.abs())
                };
                let _ = write!(
                    svg,
                    r#"<text class="change" x="{:.1}" y="{:.1}" font-size="11" text-anchor="middle" fill="{}">{}</text>"#,
                    plot.x(days[k]),
                    plot.y(cur) + dy,
                    fill,
                    label
                );
            }

            let legend_y = plot.top + 20.0 * series as f64;
            let _ = write!(
                svg,
                r#"<rect x="{:.1}" y="{:.1}" width="14" height="3" fill="{}"/><text x="{:.1}" y="{:.1}" font-size="12">{}</text>"#,
                plot.right + 20.0,
                legend_y,
                color,
                plot.right + 40.0,
                legend_y + 5.0,
                MarkupDisplay::new_unsafe(&sorted.tenors()[i], Html)
            );
        }
        svg.push_str("</svg>");

        Some(Chart {
            file_name: "chart.svg".to_string(),
            content_type: "image/svg+xml",
            bytes: svg.into_bytes(),
        })
    }
}

impl SvgChartRenderer {
    fn axes(&self, svg: &mut String, plot: &Plot, table: &CleanTable, days: &[f64]) {
        let _ = write!(
            svg,
            r##"<g stroke="#333"><line x1="{l}" y1="{b}" x2="{r}" y2="{b}"/><line x1="{l}" y1="{t}" x2="{l}" y2="{b}"/></g>"##,
            l = plot.left,
            r = plot.right,
            t = plot.top,
            b = plot.bottom
        );
        for step in 0..=4 {
            let v = plot.y_min + (plot.y_max - plot.y_min) * step as f64 / 4.0;
            let y = plot.y(v);
            let _ = write!(
                svg,
                r##"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#ddd"/><text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end">{:.4}</text>"##,
                plot.left,
                plot.right,
                plot.left - 6.0,
                y + 4.0,
                v,
                y = y
            );
        }
        let every = (table.len() / 20).max(1);
        for (k, record) in table.records().iter().enumerate().step_by(every) {
            let x = plot.x(days[k]);
            let _ = write!(
                svg,
                r#"<text x="{x:.1}" y="{y:.1}" font-size="11" text-anchor="end" transform="rotate(-45 {x:.1} {y:.1})">{d}</text>"#,
                x = x,
                y = plot.bottom + 16.0,
                d = record.date.format("%Y-%m-%d")
            );
        }
        let _ = write!(
            svg,
            r#"<text x="20" y="{:.1}" font-size="12" transform="rotate(-90 20 {:.1})" text-anchor="middle">Rate (%)</text>"#,
            (plot.top + plot.bottom) / 2.0,
            (plot.top + plot.bottom) / 2.0
        );
    }
}
