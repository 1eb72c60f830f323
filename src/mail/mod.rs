use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::SmtpConfig;

pub mod templates;

pub use templates::Email;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, email: Email) -> anyhow::Result<()>;
}

/// Sends in the background; failures are logged and otherwise dropped.
pub fn send_detached(mailer: Arc<dyn Mailer>, to: String, email: Email) {
    tokio::spawn(async move {
        let subject = email.subject.clone();
        if let Err(e) = mailer.send(&to, email).await {
            error!(error = ?e, to = %to, subject = %subject, "email delivery failed");
        }
    });
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .with_context(|| format!("smtp relay {}", cfg.host))?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self {
            transport,
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, email: Email) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse::<Mailbox>().context("parse sender address")?)
            .to(to.parse::<Mailbox>().context("parse recipient address")?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .context("build email")?;
        self.transport.send(message).await.context("smtp send")?;
        info!(to = %to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Used when SMTP is not configured: the email is only logged.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, email: Email) -> anyhow::Result<()> {
        info!(to = %to, subject = %email.subject, body = %email.text, "smtp not configured; email logged");
        Ok(())
    }
}

/// Keeps every message; lets tests read OTPs and reset links.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: tokio::sync::Mutex<Vec<(String, Email)>>,
}

#[cfg(test)]
impl RecordingMailer {
    pub async fn all_to(&self, to: &str) -> Vec<Email> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(addr, _)| addr == to)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Waits for detached deliveries to land.
    pub async fn wait_for(&self, to: &str, subject: &str) -> Option<Email> {
        for _ in 0..100 {
            let found = self
                .all_to(to)
                .await
                .into_iter()
                .rev()
                .find(|e| e.subject == subject);
            if found.is_some() {
                return found;
            }
            tokio::task::yield_now().await;
        }
        None
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, email: Email) -> anyhow::Result<()> {
        self.sent.lock().await.push((to.to_string(), email));
        Ok(())
    }
}
