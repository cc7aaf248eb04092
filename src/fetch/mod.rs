// src/fetch/mod.rs

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};
use url::Url;

use crate::process::date_parser::yymmdd;

/// Daily Japanese Yen TIBOR rate sheet published by the JBA TIBOR Administration.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://www.jbatibor.or.jp/rate/pdf/JAPANESEYENTIBOR{yymmdd}.pdf";

/// Result of asking the publisher for one day's document.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    /// The publisher has no document for that day (HTTP 404).
    NotFound,
}

/// Fill `{yymmdd}` / `{yyyymmdd}` in `template` with `date`.
pub fn document_url(template: &str, date: NaiveDate) -> Result<Url> {
    let raw = template
        .replace("{yymmdd}", &yymmdd(date))
        .replace("{yyyymmdd}", &date.format("%Y%m%d").to_string());
    Url::parse(&raw).with_context(|| format!("parsing document URL {}", raw))
}

/// Local path of the day's artifact: `<dir>/<yymmdd>.pdf`.
pub fn artifact_path(dir: impl AsRef<Path>, date: NaiveDate) -> PathBuf {
    dir.as_ref().join(format!("{}.pdf", yymmdd(date)))
}

/// Whether the day's artifact was already fetched by an earlier run.
pub fn artifact_exists(dir: impl AsRef<Path>, date: NaiveDate) -> bool {
    artifact_path(dir, date).is_file()
}

/// Download `url` to `dest` via a `.tmp` sibling; `dest` only appears once the
/// whole body is on disk.
#[instrument(level = "info", skip(client, dest), fields(dest = %dest.as_ref().display()))]
pub async fn fetch_document(
    client: &Client,
    url: &Url,
    dest: impl AsRef<Path>,
) -> Result<FetchOutcome> {
    let dest = dest.as_ref();
    let resp = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?;

    if resp.status() == StatusCode::NOT_FOUND {
        info!(%url, "document not published");
        return Ok(FetchOutcome::NotFound);
    }
    let resp = resp
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?;
    let body = resp
        .bytes()
        .await
        .with_context(|| format!("Reading body from {}", url))?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = dest.with_extension("pdf.tmp");
    fs::write(&tmp, &body)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, dest)
        .await
        .with_context(|| format!("renaming {} → {}", tmp.display(), dest.display()))?;

    debug!(bytes = body.len(), "document saved");
    Ok(FetchOutcome::Downloaded {
        path: dest.to_path_buf(),
        bytes: body.len() as u64,
    })
}
