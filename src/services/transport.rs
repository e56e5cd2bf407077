//! services/transport.rs
//! Frontera con el transporte de correo: el dispatcher solo ve `MailTransport`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, AsyncSmtpTransport},
    AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::mailing_config::SmtpConfig;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("dirección inválida '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },
    #[error("no se pudo construir el mensaje: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("error SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("timeout tras {0:?} esperando al servidor de correo")]
    Timeout(Duration),
    #[error("el mailing no tiene destinatarios")]
    NoRecipients,
    #[error("envío rechazado: {0}")]
    Rejected(String),
}

/// Respuesta del transporte; se guarda como texto en el intento.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub delivered: usize,
    pub detail: String,
}

impl fmt::Display for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.delivered, self.detail)
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(
        &self,
        from: &str,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<TransportResponse, TransportError>;
}

/// Transporte SMTP con lettre. Un mensaje por destinatario.
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let builder = if config.host == "localhost" || config.host == "127.0.0.1" {
            // Servidor local de pruebas (MailHog, etc.), sin TLS
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        } else if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };

        let mut builder = builder.port(config.port);
        if !config.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.user.clone(),
                config.pass.clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address.parse().map_err(|source| TransportError::Address {
        address: address.to_string(),
        source,
    })
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn deliver(
        &self,
        from: &str,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<TransportResponse, TransportError> {
        if recipients.is_empty() {
            return Err(TransportError::NoRecipients);
        }

        let from = parse_mailbox(from)?;
        // Validar todas las direcciones antes de mandar nada
        let mailboxes = recipients
            .iter()
            .map(|r| parse_mailbox(r))
            .collect::<Result<Vec<_>, _>>()?;

        let mut last_detail = String::new();
        for to in mailboxes {
            let message = Message::builder()
                .from(from.clone())
                .to(to)
                .subject(subject)
                .header(ContentType::TEXT_PLAIN)
                .body(body.to_string())?;

            let response = self.mailer.send(message).await?;
            let detail = format!(
                "{} {}",
                response.code(),
                response.first_line().unwrap_or_default()
            );
            if !response.is_positive() {
                return Err(TransportError::Rejected(detail.trim_end().to_string()));
            }
            last_detail = detail;
        }

        Ok(TransportResponse {
            delivered: recipients.len(),
            detail: last_detail.trim_end().to_string(),
        })
    }
}
