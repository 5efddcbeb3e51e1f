//! SMTP delivery via lettre.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::instrument;

use peereval_core::traits::{Mailer, OutgoingMessage};

use crate::config::MailConfig;
use crate::error::MailError;

const SMTP_TIMEOUT_SECS: u64 = 30;

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })
}

/// Sends plain-text messages through an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    server: String,
}

impl SmtpMailer {
    /// Build a mailer from `[mail]` settings. STARTTLS is required when
    /// `use_tls` is set; otherwise the connection stays in plain text.
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let server = config.server.clone().unwrap_or_default();
        let sender = parse_mailbox(&config.sender)?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server).map_err(|e| {
                MailError::Relay {
                    server: server.clone(),
                    message: e.to_string(),
                }
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&server)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
            server,
        })
    }

    fn build_message(&self, message: &OutgoingMessage) -> Result<Message, MailError> {
        Message::builder()
            .from(self.sender.clone())
            .to(parse_mailbox(&message.to)?)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    #[instrument(skip(self, message), fields(server = %self.server, to = %message.to))]
    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        let email = self.build_message(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config(port: u16) -> MailConfig {
        MailConfig {
            server: Some("127.0.0.1".into()),
            port,
            username: Some("user".into()),
            password: Some("pass".into()),
            use_tls: false,
            ..Default::default()
        }
    }

    fn message(to: &str) -> OutgoingMessage {
        OutgoingMessage {
            to: to.into(),
            subject: "Peer Evaluations - Sprint 1".into(),
            body: "Hello".into(),
            round_id: Some(1),
        }
    }

    #[test]
    fn builds_plain_text_message() {
        let mailer = SmtpMailer::from_config(&local_config(2525)).unwrap();
        let email = mailer.build_message(&message("ada@example.edu")).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("To: ada@example.edu"));
        assert!(raw.contains("Subject: Peer Evaluations - Sprint 1"));
        assert!(raw.contains("no-reply@example.com"));
        assert!(raw.contains("text/plain"));
    }

    #[test]
    fn rejects_bad_sender() {
        let config = MailConfig {
            sender: "not an address".into(),
            ..local_config(2525)
        };
        assert!(matches!(
            SmtpMailer::from_config(&config),
            Err(MailError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn bad_recipient_fails_before_connecting() {
        let mailer = SmtpMailer::from_config(&local_config(2525)).unwrap();
        let err = mailer.send(&message("nobody")).await.unwrap_err();
        assert!(err.to_string().contains("invalid address"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // Bind then drop a listener to get a port nothing is serving.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mailer = SmtpMailer::from_config(&local_config(port)).unwrap();
        let err = mailer.send(&message("ada@example.edu")).await.unwrap_err();
        assert!(err.to_string().contains("SMTP delivery failed"));
    }
}
