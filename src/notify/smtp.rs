// src/notify/smtp.rs
//! Email delivery: HTML body with the chart as an inline related part.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::env;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

use super::{Notification, Notifier};
use crate::config::{SmtpConfig, SmtpSecurity};

/// `Content-ID` of the inline chart; the body refers to it as `cid:chart`.
pub const CHART_CONTENT_ID: &str = "chart";

fn content_type(raw: &str) -> Result<ContentType> {
    ContentType::parse(raw).map_err(|e| anyhow!("invalid content type {}: {:?}", raw, e))
}

/// Assemble the email: `multipart/mixed` wrapping a `multipart/related` part
/// (HTML body + inline chart), followed by the file attachments.
pub async fn email_message(notification: &Notification) -> Result<Message> {
    let sender = notification
        .sender
        .as_deref()
        .ok_or_else(|| anyhow!("notifier.sender is required for SMTP delivery"))?;
    if notification.recipients.is_empty() {
        bail!("notifier.recipients is empty");
    }

    let mut builder = Message::builder()
        .from(
            sender
                .parse::<Mailbox>()
                .with_context(|| format!("parsing sender {}", sender))?,
        )
        .subject(notification.subject.clone());
    for to in &notification.recipients {
        let mailbox = to
            .parse::<Mailbox>()
            .with_context(|| format!("parsing recipient {}", to))?;
        builder = builder.to(mailbox);
    }

    let cid = format!("cid:{}", CHART_CONTENT_ID);
    let body = SinglePart::html(notification.html(Some(&cid))?);
    let mut related = MultiPart::related().singlepart(body);
    if let Some(chart) = &notification.chart {
        related = related.singlepart(
            Attachment::new_inline(CHART_CONTENT_ID.to_string())
                .body(chart.bytes.clone(), content_type(chart.content_type)?),
        );
    }

    let mut mixed = MultiPart::mixed().multipart(related);
    for path in &notification.attachments {
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("reading attachment {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        mixed = mixed.singlepart(
            Attachment::new(name).body(bytes, content_type("application/octet-stream")?),
        );
    }

    builder.multipart(mixed).context("assembling email")
}

/// Sends notifications through an SMTP relay.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpNotifier {
    /// Build the transport. No connection is made until the first send; the
    /// password is read from `settings.password_env` when a username is set.
    pub fn new(settings: &SmtpConfig) -> Result<Self> {
        let mut builder = match settings.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .with_context(|| format!("configuring STARTTLS relay {}", settings.host))?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .with_context(|| format!("configuring TLS relay {}", settings.host))?,
            SmtpSecurity::Plain => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.host.as_str())
            }
        }
        .port(settings.port)
        .timeout(Some(Duration::from_secs(settings.timeout_secs)));

        if let Some(user) = &settings.username {
            let password = env::var(&settings.password_env).with_context(|| {
                format!("SMTP password variable ${} is not set", settings.password_env)
            })?;
            builder = builder.credentials(Credentials::new(user.clone(), password));
        }

        Ok(Self {
            transport: builder.build(),
            host: settings.host.clone(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    #[instrument(level = "info", skip_all, fields(host = %self.host, subject = %notification.subject))]
    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = email_message(notification).await?;
        self.transport
            .send(message)
            .await
            .with_context(|| format!("SMTP delivery via {} failed", self.host))?;
        info!(recipients = notification.recipients.len(), "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifierConfig;
    use crate::detect::Threshold;
    use crate::notify::compose;
    use crate::notify::tests::{date, report, svg_chart, table, url};
    use tempfile::tempdir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn settings() -> NotifierConfig {
        NotifierConfig {
            sender: Some("rates@example.com".to_string()),
            recipients: vec![
                "desk@example.com".to_string(),
                "risk@example.com".to_string(),
            ],
            ..NotifierConfig::default()
        }
    }

    fn notification(settings: &NotifierConfig) -> Notification {
        compose(
            settings,
            date(),
            &url(),
            &table(),
            &report(),
            Threshold::default(),
            Some(svg_chart()),
        )
        .unwrap()
    }

    /// Minimal SMTP server for one session; returns the DATA payload.
    async fn smtp_sink(listener: TcpListener) -> String {
        let (sock, _) = listener.accept().await.unwrap();
        let (read, mut write) = sock.into_split();
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"220 localhost ESMTP\r\n").await.unwrap();

        let mut data = String::new();
        let mut in_data = false;
        while let Some(line) = lines.next_line().await.unwrap() {
            if in_data {
                if line == "." {
                    in_data = false;
                    write.write_all(b"250 queued\r\n").await.unwrap();
                } else {
                    data.push_str(&line);
                    data.push('\n');
                }
                continue;
            }
            let verb = line.to_ascii_uppercase();
            if verb.starts_with("EHLO") || verb.starts_with("HELO") {
                write.write_all(b"250 localhost\r\n").await.unwrap();
            } else if verb.starts_with("DATA") {
                in_data = true;
                write.write_all(b"354 end with .\r\n").await.unwrap();
            } else if verb.starts_with("QUIT") {
                let _ = write.write_all(b"221 bye\r\n").await;
                break;
            } else {
                write.write_all(b"250 ok\r\n").await.unwrap();
            }
        }
        data
    }

    #[tokio::test]
    async fn email_carries_inline_chart_and_attachments() {
        let tmp = tempdir().unwrap();
        let history = tmp.path().join("history.parquet");
        std::fs::write(&history, b"PAR1").unwrap();

        let n = crate::notify::with_attachment(notification(&settings()), &history);
        let raw = String::from_utf8(email_message(&n).await.unwrap().formatted()).unwrap();

        assert!(raw.contains("From: rates@example.com"));
        assert!(raw.contains("desk@example.com"));
        assert!(raw.contains("risk@example.com"));
        assert!(raw.contains("Subject: Japanese Yen TIBOR - 2025-09-24"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("multipart/related"));
        assert!(raw.contains("Content-ID: <chart>"));
        assert!(raw.contains("image/svg+xml"));
        assert!(raw.contains("history.parquet"));
    }

    #[tokio::test]
    async fn email_requires_sender_and_recipients() {
        let no_sender = NotifierConfig {
            sender: None,
            ..settings()
        };
        assert!(email_message(&notification(&no_sender)).await.is_err());

        let nobody = NotifierConfig {
            recipients: Vec::new(),
            ..settings()
        };
        assert!(email_message(&notification(&nobody)).await.is_err());
    }

    #[tokio::test]
    async fn sends_through_relay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(smtp_sink(listener));

        let notifier = SmtpNotifier::new(&SmtpConfig {
            host: "127.0.0.1".to_string(),
            port,
            security: SmtpSecurity::Plain,
            ..SmtpConfig::default()
        })
        .unwrap();
        notifier.send(&notification(&settings())).await.unwrap();

        let data = server.await.unwrap();
        assert!(data.contains("Subject: Japanese Yen TIBOR - 2025-09-24"));
        assert!(data.contains("Content-ID: <chart>"));
    }

    #[test]
    fn username_without_password_is_rejected() {
        let cfg = SmtpConfig {
            username: Some("rates".to_string()),
            password_env: "TIBORWATCH_TEST_UNSET_PASSWORD".to_string(),
            security: SmtpSecurity::Plain,
            ..SmtpConfig::default()
        };
        assert!(SmtpNotifier::new(&cfg).is_err());
    }
}
