// src/run.rs
//! One daily run: fetch → extract → normalize → detect → notify.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::{Config, DateSourceKind, ExtractorKind, NotifierKind};
use crate::detect::ChangeDetector;
use crate::error::NormalizeError;
use crate::extract::{CommandExtractor, SidecarExtractor, TableExtractor};
use crate::fetch::{self, FetchOutcome};
use crate::history::HistoryStore;
use crate::notify::{self, Notifier, OutboxNotifier, SmtpNotifier, WebhookNotifier};
use crate::process::{DateSource, NormalizeOptions, Normalizer};
use crate::render::{ChartRenderer, SvgChartRenderer};
use crate::table::SortOrder;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Today's document was fetched by an earlier run.
    AlreadyFetched,
    /// The publisher has no document for the run date.
    NotPublished,
    /// The document held no rate rows; nothing was sent.
    NoData,
    Notified { records: usize, changed: Vec<String> },
}

pub fn run_date(cfg: &Config) -> NaiveDate {
    cfg.run_date.unwrap_or_else(|| Local::now().date_naive())
}

pub fn http_client(cfg: &Config) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()
        .context("building HTTP client")
}

pub fn build_extractor(cfg: &Config) -> Box<dyn TableExtractor> {
    match cfg.extractor.kind {
        ExtractorKind::Command => Box::new(CommandExtractor {
            program: cfg.extractor.program.clone(),
            args: cfg.extractor.args.clone(),
            format: cfg.extractor.format,
        }),
        ExtractorKind::Sidecar => Box::new(SidecarExtractor {
            format: cfg.extractor.format,
        }),
    }
}

pub fn build_notifier(cfg: &Config, client: &Client) -> Result<Box<dyn Notifier>> {
    Ok(match cfg.notifier.kind {
        NotifierKind::Smtp => Box::new(SmtpNotifier::new(&cfg.notifier.smtp)?),
        NotifierKind::Outbox => Box::new(OutboxNotifier::new(&cfg.notifier.outbox_dir)),
        NotifierKind::Webhook => {
            let raw = cfg
                .notifier
                .webhook_url
                .as_deref()
                .ok_or_else(|| anyhow!("notifier.webhook_url is required for kind: webhook"))?;
            let url = Url::parse(raw).with_context(|| format!("parsing webhook URL {}", raw))?;
            Box::new(WebhookNotifier::new(client.clone(), url))
        }
    })
}

/// Full run with collaborators built from `cfg`.
pub async fn run(cfg: &Config) -> Result<RunOutcome> {
    let client = http_client(cfg)?;
    let extractor = build_extractor(cfg);
    let notifier = build_notifier(cfg, &client)?;
    run_with(cfg, run_date(cfg), &client, extractor.as_ref(), notifier.as_ref()).await
}

#[instrument(level = "info", skip_all, fields(date = %date))]
pub async fn run_with(
    cfg: &Config,
    date: NaiveDate,
    client: &Client,
    extractor: &dyn TableExtractor,
    notifier: &dyn Notifier,
) -> Result<RunOutcome> {
    // ─── 1) skip days already handled ────────────────────────────────
    let dest = fetch::artifact_path(&cfg.data_dir, date);
    if fetch::artifact_exists(&cfg.data_dir, date) {
        info!(path = %dest.display(), "document already fetched; skipping");
        return Ok(RunOutcome::AlreadyFetched);
    }

    // ─── 2) fetch ────────────────────────────────────────────────────
    let url = fetch::document_url(&cfg.url_template, date)?;
    match fetch::fetch_document(client, &url, &dest).await? {
        FetchOutcome::NotFound => return Ok(RunOutcome::NotPublished),
        FetchOutcome::Downloaded { bytes, .. } => info!(bytes, %url, "document fetched"),
    }

    process_document(cfg, date, &url, &dest, extractor, notifier).await
}

/// Everything after the fetch: extract, normalize, merge, detect, notify.
#[instrument(level = "info", skip_all, fields(path = %document.display()))]
pub async fn process_document(
    cfg: &Config,
    date: NaiveDate,
    url: &Url,
    document: &Path,
    extractor: &dyn TableExtractor,
    notifier: &dyn Notifier,
) -> Result<RunOutcome> {
    // ─── 3) extract ──────────────────────────────────────────────────
    let fragments = extractor
        .extract(document)
        .await
        .with_context(|| format!("extracting tables from {}", document.display()))?;
    info!(fragments = fragments.len(), "tables extracted");

    // ─── 4) normalize ────────────────────────────────────────────────
    let dates = match cfg.date_source {
        DateSourceKind::Derived => DateSource::Derived { published: date },
        DateSourceKind::Column => DateSource::Column,
    };
    let normalizer = Normalizer::new(
        cfg.tenors.clone(),
        NormalizeOptions {
            delimiter: cfg.delimiter,
            dates,
        },
    );
    let normalized = match normalizer.normalize(&fragments) {
        Ok(n) => n,
        Err(NormalizeError::EmptyInput) => {
            warn!("no rate rows in document; skipping notification");
            return Ok(RunOutcome::NoData);
        }
        Err(e) => return Err(e).context("normalizing extracted tables"),
    };
    if !normalized.warnings.is_empty() {
        warn!(count = normalized.warnings.len(), "cells kept as missing");
    }

    // ─── 5) history ──────────────────────────────────────────────────
    let table = match &cfg.history_path {
        Some(path) => HistoryStore::new(path, cfg.tenors.clone())
            .merge_and_save(&normalized.table)
            .context("updating rate history")?,
        None => normalized.table,
    };

    // ─── 6) detect ───────────────────────────────────────────────────
    let detector = ChangeDetector::new(cfg.threshold);
    let newest_first = table.sorted(SortOrder::Descending);
    let report = detector.detect(&newest_first);
    info!(
        records = table.len(),
        changed = ?report.tenors(),
        "change detection done"
    );

    // ─── 7) render + notify ──────────────────────────────────────────
    let chart = if cfg.chart.enabled {
        let renderer = SvgChartRenderer {
            title: cfg.chart.title.clone(),
            min_points: cfg.chart.min_points,
            ..SvgChartRenderer::default()
        };
        renderer.render(&table, cfg.threshold)
    } else {
        None
    };

    let mut notification = notify::compose(
        &cfg.notifier,
        date,
        url,
        &table,
        &report,
        cfg.threshold,
        chart,
    )?;
    if let Some(path) = &cfg.history_path {
        notification = notify::with_attachment(notification, path);
    }
    notifier.send(&notification).await?;

    Ok(RunOutcome::Notified {
        records: table.len(),
        changed: notification.changed,
    })
}
