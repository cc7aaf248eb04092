// src/config.rs

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::detect::Threshold;
use crate::extract::ExtractFormat;
use crate::fetch::DEFAULT_URL_TEMPLATE;

pub const CONFIG_ENV: &str = "TIBORWATCH_CONFIG";

pub const DEFAULT_TENORS: &[&str] = &[
    "1WEEK", "1MONTH", "2MONTH", "3MONTH", "4MONTH", "5MONTH", "6MONTH", "7MONTH", "8MONTH",
    "9MONTH", "10MONTH", "11MONTH", "12MONTH",
];

/// Run configuration, read once at startup. Every field has a default, so an
/// empty YAML document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document URL; `{yymmdd}` / `{yyyymmdd}` are replaced by the run date.
    pub url_template: String,
    /// Where fetched documents are kept; also the "already fetched" marker.
    pub data_dir: PathBuf,
    /// Parquet file accumulating the rate history; no history when unset.
    pub history_path: Option<PathBuf>,
    pub tenors: Vec<String>,
    pub delimiter: char,
    pub threshold: Threshold,
    pub date_source: DateSourceKind,
    pub extractor: ExtractorConfig,
    pub notifier: NotifierConfig,
    pub chart: ChartConfig,
    pub http_timeout_secs: u64,
    /// Fixed run date instead of today's local date.
    pub run_date: Option<NaiveDate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            data_dir: PathBuf::from("data"),
            history_path: None,
            tenors: DEFAULT_TENORS.iter().map(|s| s.to_string()).collect(),
            delimiter: '\r',
            threshold: Threshold::default(),
            date_source: DateSourceKind::Derived,
            extractor: ExtractorConfig::default(),
            notifier: NotifierConfig::default(),
            chart: ChartConfig::default(),
            http_timeout_secs: 10,
            run_date: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSourceKind {
    /// Walk back from the run date, one day per stacked value.
    Derived,
    /// Read dates from the table's leading date column.
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    Command,
    Sidecar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub kind: ExtractorKind,
    pub program: String,
    pub args: Vec<String>,
    pub format: ExtractFormat,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            kind: ExtractorKind::Command,
            program: "java".to_string(),
            args: [
                "-jar",
                "tabula.jar",
                "--lattice",
                "--pages",
                "all",
                "--format",
                "JSON",
                "{path}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            format: ExtractFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    Smtp,
    Outbox,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    /// Subject prefix; the run date is appended.
    pub title: String,
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub outbox_dir: PathBuf,
    pub webhook_url: Option<String>,
    pub smtp: SmtpConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Smtp,
            title: "Japanese Yen TIBOR".to_string(),
            sender: None,
            recipients: Vec::new(),
            outbox_dir: PathBuf::from("outbox"),
            webhook_url: None,
            smtp: SmtpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587).
    StartTls,
    /// TLS from the first byte (port 465).
    Tls,
    /// No encryption; local relays and tests only.
    Plain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    /// Login name; no authentication when unset.
    pub username: Option<String>,
    /// Environment variable holding the password, read when the notifier is built.
    pub password_env: String,
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            security: SmtpSecurity::StartTls,
            username: None,
            password_env: "TIBORWATCH_SMTP_PASSWORD".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub enabled: bool,
    pub min_points: usize,
    pub title: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_points: 2,
            title: "Japanese Yen TIBOR Rates (Daily Changes)".to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("parsing YAML config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        Self::from_yaml(&text).with_context(|| format!("in config {:?}", path))
    }

    /// Config path from `$TIBORWATCH_CONFIG`, else the first CLI argument;
    /// built-in defaults when neither is given.
    pub fn from_env_or_args() -> Result<Self> {
        match env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| env::args_os().nth(1).map(PathBuf::from))
        {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
