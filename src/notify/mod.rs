// src/notify/mod.rs
//! Composing the daily rate message and handing it to a transport.

mod smtp;

pub use smtp::{email_message, SmtpNotifier, CHART_CONTENT_ID};

use anyhow::{Context, Result};
use askama::Template;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

use crate::config::NotifierConfig;
use crate::detect::{ChangeReport, Threshold};
use crate::render::{html_table, Chart};
use crate::table::CleanTable;

/// One row of the change table at the top of the message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLine {
    pub tenor: String,
    pub previous: String,
    pub current: String,
    pub change: String,
}

#[derive(Template)]
#[template(path = "message.html")]
struct MessageTemplate<'a> {
    subject: &'a str,
    changed: String,
    threshold: &'a str,
    changes: &'a [ChangeLine],
    document_url: &'a str,
    chart_src: Option<&'a str>,
    rate_table: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub date: NaiveDate,
    pub subject: String,
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub changed: Vec<String>,
    pub threshold: String,
    pub change_lines: Vec<ChangeLine>,
    pub document_url: String,
    /// Pre-rendered rate table markup.
    pub rate_table: String,
    pub chart: Option<Chart>,
    pub attachments: Vec<PathBuf>,
}

impl Notification {
    /// Full HTML page. `chart_src` is how the transport refers to the chart:
    /// a file name next to the page, or a `cid:` reference inside an email.
    pub fn html(&self, chart_src: Option<&str>) -> Result<String> {
        MessageTemplate {
            subject: &self.subject,
            changed: self.changed.join(", "),
            threshold: &self.threshold,
            changes: &self.change_lines,
            document_url: &self.document_url,
            chart_src: self.chart.as_ref().and(chart_src),
            rate_table: &self.rate_table,
        }
        .render()
        .context("rendering message template")
    }
}

/// Build the message for one run: warning banner for changed tenors, link to
/// the source document, optional chart, then the full rate table.
pub fn compose(
    settings: &NotifierConfig,
    date: NaiveDate,
    document_url: &Url,
    table: &CleanTable,
    report: &ChangeReport,
    threshold: Threshold,
    chart: Option<Chart>,
) -> Result<Notification> {
    let change_lines = report
        .changes
        .iter()
        .map(|c| ChangeLine {
            tenor: c.tenor.clone(),
            previous: format!("{:.4}", c.previous),
            current: format!("{:.4}", c.current),
            change: match c.relative() {
                Some(r) => format!("{:+.2}%", r * 100.0),
                None => format!("{:+.4}", c.delta),
            },
        })
        .collect();

    Ok(Notification {
        date,
        subject: format!("{} - {}", settings.title, date.format("%Y-%m-%d")),
        sender: settings.sender.clone(),
        recipients: settings.recipients.clone(),
        changed: report.tenors().into_iter().map(str::to_string).collect(),
        threshold: threshold.describe(),
        change_lines,
        document_url: document_url.to_string(),
        rate_table: html_table(table).context("rendering rate table")?,
        chart,
        attachments: Vec::new(),
    })
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes each notification to `<dir>/<YYYY-MM-DD>/`: `index.html`, the chart
/// file, and copies of the attachments.
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn message_dir(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(date.format("%Y-%m-%d").to_string())
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    #[instrument(level = "info", skip_all, fields(subject = %notification.subject))]
    async fn send(&self, notification: &Notification) -> Result<()> {
        let dir = self.message_dir(notification.date);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;

        let chart_src = notification.chart.as_ref().map(|c| c.file_name.as_str());
        fs::write(dir.join("index.html"), notification.html(chart_src)?)
            .await
            .with_context(|| format!("writing message into {}", dir.display()))?;

        if let Some(chart) = &notification.chart {
            fs::write(dir.join(&chart.file_name), &chart.bytes)
                .await
                .with_context(|| format!("writing {}", chart.file_name))?;
        }
        for src in &notification.attachments {
            let Some(name) = src.file_name() else {
                continue;
            };
            fs::copy(src, dir.join(name))
                .await
                .with_context(|| format!("attaching {}", src.display()))?;
        }
        info!(dir = %dir.display(), "message written to outbox");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    from: Option<&'a str>,
    to: &'a [String],
    changed: &'a [String],
    html: String,
    chart_svg: Option<String>,
    attachments: Vec<String>,
}

/// POSTs each notification as JSON to a relay endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(level = "info", skip_all, fields(url = %self.url))]
    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = WebhookPayload {
            subject: &notification.subject,
            from: notification.sender.as_deref(),
            to: &notification.recipients,
            changed: &notification.changed,
            html: notification.html(notification.chart.as_ref().map(|c| c.file_name.as_str()))?,
            chart_svg: notification
                .chart
                .as_ref()
                .map(|c| String::from_utf8_lossy(&c.bytes).into_owned()),
            attachments: notification
                .attachments
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        };
        self.client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", self.url))?;
        info!("notification delivered");
        Ok(())
    }
}

/// Attach a file if it exists.
pub fn with_attachment(mut notification: Notification, path: &Path) -> Notification {
    if path.is_file() {
        notification.attachments.push(path.to_path_buf());
    }
    notification
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detect::TenorChange;
    use crate::table::TenorRecord;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    pub(crate) fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 24).unwrap()
    }

    pub(crate) fn table() -> CleanTable {
        CleanTable::new(
            vec!["1WEEK".to_string()],
            vec![
                TenorRecord::new(NaiveDate::from_ymd_opt(2025, 9, 23).unwrap(), vec![Some(0.5)]),
                TenorRecord::new(date(), vec![Some(0.51)]),
            ],
        )
        .unwrap()
    }

    pub(crate) fn report() -> ChangeReport {
        ChangeReport {
            changes: vec![TenorChange {
                tenor: "1WEEK".to_string(),
                previous: 0.5,
                current: 0.51,
                delta: 0.51 - 0.5,
            }],
        }
    }

    pub(crate) fn url() -> Url {
        Url::parse("https://example.com/doc.pdf").unwrap()
    }

    pub(crate) fn svg_chart() -> Chart {
        Chart {
            file_name: "chart.svg".to_string(),
            content_type: "image/svg+xml",
            bytes: b"<svg/>".to_vec(),
        }
    }

    #[test]
    fn compose_warns_about_changed_tenors() {
        let n = compose(
            &NotifierConfig::default(),
            date(),
            &url(),
            &table(),
            &report(),
            Threshold::default(),
            None,
        )
        .unwrap();
        assert_eq!(n.subject, "Japanese Yen TIBOR - 2025-09-24");
        assert_eq!(n.changed, vec!["1WEEK".to_string()]);

        let html = n.html(Some("chart.svg")).unwrap();
        assert!(html.contains("Note: 1WEEK changed by more than 0.1%"));
        assert!(html.contains("<td>+2.00%</td>"));
        assert!(html.contains("doc.pdf"));
        assert!(html.contains("<td>2025-09-23</td><td>0.5000</td>"));
        // no chart, so no image even when a source is offered
        assert!(!html.contains("<img"));
    }

    #[test]
    fn compose_without_changes_has_no_banner() {
        let n = compose(
            &NotifierConfig::default(),
            date(),
            &url(),
            &table(),
            &ChangeReport::default(),
            Threshold::default(),
            Some(svg_chart()),
        )
        .unwrap();
        let html = n.html(Some("chart.svg")).unwrap();
        assert!(!html.contains("Note:"));
        assert!(html.contains("<img src=\"chart.svg\""));
        assert!(n.changed.is_empty());
    }

    #[test]
    fn message_text_is_escaped() {
        let settings = NotifierConfig {
            title: "Yen <TIBOR>".to_string(),
            ..NotifierConfig::default()
        };
        let n = compose(
            &settings,
            date(),
            &url(),
            &table(),
            &report(),
            Threshold::default(),
            None,
        )
        .unwrap();
        let html = n.html(None).unwrap();
        assert!(html.contains("<title>Yen &lt;TIBOR&gt; - 2025-09-24</title>"));
    }

    #[tokio::test]
    async fn outbox_writes_message_chart_and_attachments() {
        let tmp = tempdir().unwrap();
        let attachment = tmp.path().join("history.parquet");
        std::fs::write(&attachment, b"PAR1").unwrap();

        let n = compose(
            &NotifierConfig::default(),
            date(),
            &url(),
            &table(),
            &report(),
            Threshold::default(),
            Some(svg_chart()),
        )
        .unwrap();
        let n = with_attachment(n, &attachment);
        let n = with_attachment(n, &tmp.path().join("missing.parquet"));
        assert_eq!(n.attachments.len(), 1);

        let outbox = OutboxNotifier::new(tmp.path().join("outbox"));
        outbox.send(&n).await.unwrap();

        let dir = outbox.message_dir(date());
        let page = std::fs::read_to_string(dir.join("index.html")).unwrap();
        assert!(page.contains("<title>Japanese Yen TIBOR - 2025-09-24</title>"));
        assert!(page.contains("<img src=\"chart.svg\""));
        assert_eq!(std::fs::read(dir.join("chart.svg")).unwrap(), b"<svg/>");
        assert!(dir.join("history.parquet").is_file());
    }

    #[tokio::test]
    async fn webhook_posts_json() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = vec![0u8; 8192];
            loop {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let len = text[..end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            sock.write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            let text = String::from_utf8_lossy(&raw).to_string();
            let body_start = text.find("\r\n\r\n").unwrap() + 4;
            text[body_start..].to_string()
        });

        let settings = NotifierConfig {
            recipients: vec!["desk@example.com".to_string()],
            ..NotifierConfig::default()
        };
        let n = compose(
            &settings,
            date(),
            &url(),
            &table(),
            &report(),
            Threshold::default(),
            None,
        )
        .unwrap();
        let hook = WebhookNotifier::new(
            Client::new(),
            Url::parse(&format!("http://{}/notify", addr)).unwrap(),
        );
        hook.send(&n).await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(body["subject"], "Japanese Yen TIBOR - 2025-09-24");
        assert_eq!(body["to"][0], "desk@example.com");
        assert_eq!(body["changed"][0], "1WEEK");
        assert!(body["html"].as_str().unwrap().contains("Note: 1WEEK"));
        assert!(body["chart_svg"].is_null());
    }
}
