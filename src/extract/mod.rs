// src/extract/mod.rs
//! Table extraction: published document → `RawTableFragment`s.
//!
//! PDF table detection itself is delegated to an external tool (tabula by
//! default); this module runs it and reads its JSON or CSV output.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::process::RawTableFragment;

#[async_trait]
pub trait TableExtractor: Send + Sync {
    async fn extract(&self, document: &Path) -> Result<Vec<RawTableFragment>>;
}

/// Output format of an extraction tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractFormat {
    /// tabula `--format JSON`: an array of tables, each `{"data": [[{"text": ..}]]}`.
    #[default]
    Json,
    /// A single table as CSV.
    Csv,
}

#[derive(Deserialize)]
struct TabulaTable {
    data: Vec<Vec<TabulaCell>>,
}

#[derive(Deserialize)]
struct TabulaCell {
    #[serde(default)]
    text: String,
}

/// Parse tabula's JSON output; one fragment per detected table.
pub fn parse_tabula_json(text: &str) -> Result<Vec<RawTableFragment>> {
    let tables: Vec<TabulaTable> =
        serde_json::from_str(text).context("parsing tabula JSON output")?;
    Ok(tables
        .into_iter()
        .map(|t| {
            RawTableFragment::new(
                t.data
                    .into_iter()
                    .map(|row| row.into_iter().map(|c| c.text).collect())
                    .collect(),
            )
        })
        .collect())
}

/// Parse one CSV table. Rows may be ragged; quoted cells keep embedded line breaks.
pub fn parse_csv_fragment(text: &str) -> Result<RawTableFragment> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading CSV record {}", i))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawTableFragment::new(rows))
}

fn parse_output(format: ExtractFormat, text: &str) -> Result<Vec<RawTableFragment>> {
    match format {
        ExtractFormat::Json => parse_tabula_json(text),
        ExtractFormat::Csv => Ok(vec![parse_csv_fragment(text)?]),
    }
}

/// Runs an external extraction command; `{path}` in `args` is replaced by the
/// document path and the tool's stdout is parsed as `format`.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    pub program: String,
    pub args: Vec<String>,
    pub format: ExtractFormat,
}

impl CommandExtractor {
    /// `java -jar tabula.jar --lattice --pages all --format JSON <path>`
    pub fn tabula(jar: impl AsRef<Path>) -> Self {
        Self {
            program: "java".to_string(),
            args: vec![
                "-jar".to_string(),
                jar.as_ref().display().to_string(),
                "--lattice".to_string(),
                "--pages".to_string(),
                "all".to_string(),
                "--format".to_string(),
                "JSON".to_string(),
                "{path}".to_string(),
            ],
            format: ExtractFormat::Json,
        }
    }
}

#[async_trait]
impl TableExtractor for CommandExtractor {
    #[instrument(level = "info", skip(self), fields(program = %self.program))]
    async fn extract(&self, document: &Path) -> Result<Vec<RawTableFragment>> {
        let path = document.display().to_string();
        let args: Vec<String> = self.args.iter().map(|a| a.replace("{path}", &path)).collect();
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("spawning {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let fragments = parse_output(self.format, &stdout)?;
        debug!(fragments = fragments.len(), "extracted");
        Ok(fragments)
    }
}

/// Reads tables that were extracted ahead of time into a sidecar file next to
/// the document (`250924.pdf` → `250924.json` or `250924.csv`).
#[derive(Debug, Clone, Default)]
pub struct SidecarExtractor {
    pub format: ExtractFormat,
}

impl SidecarExtractor {
    pub fn sidecar_path(&self, document: &Path) -> PathBuf {
        let ext = match self.format {
            ExtractFormat::Json => "json",
            ExtractFormat::Csv => "csv",
        };
        document.with_extension(ext)
    }
}

#[async_trait]
impl TableExtractor for SidecarExtractor {
    async fn extract(&self, document: &Path) -> Result<Vec<RawTableFragment>> {
        let sidecar = self.sidecar_path(document);
        let text = tokio::fs::read_to_string(&sidecar)
            .await
            .with_context(|| format!("reading {}", sidecar.display()))?;
        parse_output(self.format, &text)
    }
}
