use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{config::SmtpConfig, AppError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    pub fn otp(to: &str, code: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your OTP Code".to_string(),
            body: format!("Your OTP is: {}", code),
        }
    }

    pub fn invitation(to: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Complete Your Registration".to_string(),
            body: format!(
                "Please complete your registration by clicking on the following link: {}",
                link
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), AppError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::Internal(format!("Invalid SMTP relay: {}", e)))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), AppError> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?,
            )
            .to(mail
                .to
                .parse()
                .map_err(|e| AppError::BadRequest(format!("Invalid recipient: {}", e)))?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        self.transport.send(message).await.map_err(|e| {
            tracing::error!(error = %e, to = %mail.to, "SMTP delivery failed");
            AppError::Internal("Failed to send email".to_string())
        })?;

        tracing::info!(to = %mail.to, "Email sent");
        Ok(())
    }
}

/// Development mailer: writes the message to the log instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), AppError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.body,
            "SMTP not configured; email logged instead of sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_mail_contains_code() {
        let mail = OutgoingMail::otp("dr@clinic.org", "004211");
        assert_eq!(mail.subject, "Your OTP Code");
        assert!(mail.body.ends_with("004211"));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        let mail = OutgoingMail::invitation("dr@clinic.org", "http://localhost/register");
        assert!(LogMailer.send(mail).await.is_ok());
    }
}
