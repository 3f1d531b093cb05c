use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::error::StaleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl Email {
    /// Formats the email as an RFC 5322 message with CRLF line endings.
    pub fn to_message(&self) -> String {
        fn header_value(v: &str) -> String {
            v.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
        }

        let mut message = String::new();
        let _ = write!(message, "To: {}\r\n", header_value(&self.to));
        let _ = write!(message, "Subject: {}\r\n", header_value(&self.subject));

        for (name, value) in &self.headers {
            let _ = write!(message, "{}: {}\r\n", header_value(name), header_value(value));
        }

        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        message.push_str("\r\n");

        for line in self.body.lines() {
            message.push_str(line);
            message.push_str("\r\n");
        }

        message
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), StaleError>;
}

pub fn make_transport(cfg: &MailConfig) -> Arc<dyn MailTransport> {
    match cfg {
        MailConfig::Sendmail(cfg) => Arc::new(SendmailTransport::new(cfg.path.clone())),
        MailConfig::Log => Arc::new(LogTransport),
    }
}

/// Hands messages to a sendmail-compatible binary.
pub struct SendmailTransport {
    path: PathBuf,
}

impl SendmailTransport {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn deliver(&self, email: &Email) -> anyhow::Result<()> {
        let mut child = Command::new(&self.path)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| anyhow!("could not run `{}`", self.path.display()))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .context("could not open the standard input of sendmail")?;
            stdin
                .write_all(email.to_message().as_bytes())
                .await
                .context("could not pass the message to sendmail")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("could not wait for sendmail to finish")?;

        if !output.status.success() {
            bail!(
                "`{}` exited with {}: {}",
                self.path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim(),
            );
        }

        Ok(())
    }
}

#[async_trait]
impl MailTransport for SendmailTransport {
    async fn send(&self, email: &Email) -> Result<(), StaleError> {
        debug!(to = %email.to, sendmail = %self.path.display(), "Sending an email");

        self.deliver(email)
            .await
            .map_err(StaleError::MailTransportFailure)
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &Email) -> Result<(), StaleError> {
        info!(to = %email.to, subject = %email.subject, "Email:\n{}", email.body);

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<Email>>,
        pub fail: bool,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, email: &Email) -> Result<(), StaleError> {
            self.sent.lock().unwrap().push(email.clone());

            if self.fail {
                Err(StaleError::MailTransportFailure(anyhow!("connection refused")))
            } else {
                Ok(())
            }
        }
    }

    fn email() -> Email {
        Email {
            to: "admin@example.com".into(),
            subject: "Hi\r\nBcc: victim@example.com".into(),
            body: "Hello,\n\nBye".into(),
            headers: vec![("From".into(), "Site <admin@example.com>".into())],
        }
    }

    #[test]
    fn test_message_format() {
        assert_eq!(
            email().to_message(),
            "To: admin@example.com\r\n\
            Subject: HiBcc: victim@example.com\r\n\
            From: Site <admin@example.com>\r\n\
            MIME-Version: 1.0\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            \r\n\
            Hello,\r\n\
            \r\n\
            Bye\r\n"
        );
    }

    #[tokio::test]
    async fn test_sendmail_missing_binary() {
        let transport = SendmailTransport::new("/nonexistent/sendmail".into());

        assert!(matches!(
            transport.send(&email()).await,
            Err(StaleError::MailTransportFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_log_transport_never_fails() {
        LogTransport.send(&email()).await.unwrap();
    }
}
