use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox}, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use super::{BillingEvent, Notifier};
use crate::config::SmtpConfig;
use crate::error::{AppError, Result};

/// Mails the payer when a payment is returned or the collaboration is
/// suspended.
pub struct EmailNotifier {
    config: SmtpConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::Config(format!("Invalid SMTP relay {}: {}", config.host, e)))?
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .build();

        Ok(Self { config, mailer })
    }

    fn build_message(&self, recipient: &str, event: &BillingEvent) -> Result<Message> {
        let (subject, body) = event.message();

        Message::builder()
            .from(
                self.config
                    .from_address
                    .parse::<Mailbox>()
                    .map_err(|e| AppError::Config(format!("Invalid from address: {}", e)))?,
            )
            .to(recipient
                .parse::<Mailbox>()
                .map_err(|e| AppError::Validation(format!("Invalid recipient {}: {}", recipient, e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Internal(format!("Could not build e-mail: {}", e)))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn notify(&self, event: &BillingEvent) -> Result<()> {
        let Some(recipient) = event.recipient() else {
            tracing::debug!(
                "No recipient for {} of collaboration {}",
                event.name(),
                event.collaboration().id
            );
            return Ok(());
        };

        let message = self.build_message(recipient, event)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| AppError::External(format!("SMTP error: {}", e)))?;

        tracing::info!("Sent {} e-mail for collaboration {}", event.name(), event.collaboration().id);
        Ok(())
    }
}
