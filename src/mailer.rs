//! Mail transports used by workers.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::error::TransportError;
use crate::job::Job;

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, job: &Job) -> Result<(), TransportError>;
}

/// SMTP submission, STARTTLS when `use_tls` is set.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, TransportError> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
                .map_err(|err| TransportError::Connection(err.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
        };
        let mut builder = builder.port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose().to_string(),
            ));
        }

        let sender = config
            .sender
            .parse::<Mailbox>()
            .map_err(|err| TransportError::InvalidMessage(format!("sender {:?}: {err}", config.sender)))?;

        Ok(Self {
            transport: builder.build(),
            sender,
        })
    }

    fn build_message(&self, job: &Job) -> Result<Message, TransportError> {
        let recipient = job
            .recipient
            .parse::<Mailbox>()
            .map_err(|err| TransportError::InvalidMessage(format!("recipient {:?}: {err}", job.recipient)))?;
        Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(job.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(job.body.clone())
            .map_err(|err| TransportError::InvalidMessage(err.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, job: &Job) -> Result<(), TransportError> {
        let message = self.build_message(job)?;
        match self.transport.send(message).await {
            Ok(response) => {
                debug!(code = %response.code(), recipient = %job.recipient, "smtp accepted message");
                Ok(())
            }
            Err(err) if err.is_permanent() || err.is_transient() => {
                Err(TransportError::Rejected(err.to_string()))
            }
            Err(err) => Err(TransportError::Connection(err.to_string())),
        }
    }
}

/// Writes the message to the log instead of sending it. Development mode only.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl MailTransport for LogMailer {
    async fn send(&self, job: &Job) -> Result<(), TransportError> {
        info!(
            channel = "log",
            recipient = %job.recipient,
            subject = %job.subject,
            body = %job.body,
            "email would be sent"
        );
        Ok(())
    }
}
