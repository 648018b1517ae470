//! SMTP delivery through `lettre`.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport as _};
use tracing::{debug, info};

use crate::error::{MergeError, Result, TransportError};
use crate::transport::{compose, BccHeader, OutgoingMessage, Transport};

/// Port that speaks TLS from the first byte; anything else uses STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Connection parameters for an SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Sends each message over a pooled SMTP connection.
pub struct SmtpSender {
    mailer: SmtpTransport,
}

impl SmtpSender {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let builder = if config.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
        }
        .map_err(|e| MergeError::TransportSetup(format!("{}: {e}", config.host)))?
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(user), Some(password)) => {
                builder.credentials(Credentials::new(user.clone(), password.clone()))
            }
            _ => builder,
        };

        info!(host = %config.host, port = config.port, "Using SMTP relay");
        Ok(Self {
            mailer: builder.build(),
        })
    }
}

impl Transport for SmtpSender {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn send(&mut self, message: &OutgoingMessage<'_>) -> std::result::Result<(), TransportError> {
        let email = compose(message, BccHeader::Drop)?;
        let response = self.mailer.send(&email).map_err(|e| TransportError::Delivery {
            transport: "smtp",
            reason: e.to_string(),
        })?;
        debug!(to = %message.to, code = %response.code(), "SMTP accepted message");
        Ok(())
    }
}
