//! Email delivery over SMTP.
//!
//! The body is rendered from a Handlebars template that receives
//! `Triggers` (the ordered descriptor list) and `Dump` (the aggregated
//! result as pretty JSON). Port 465 uses implicit TLS; any other port
//! upgrades with STARTTLS when the server offers it.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use handlebars::Handlebars;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use super::{Notification, NotificationSink};
use crate::config::EmailSinkConfig;
use crate::error::{ParleyError, ParleyResult};

const TEMPLATE_NAME: &str = "notification";
const IMPLICIT_TLS_PORT: u16 = 465;

/// Email notification sink
pub struct EmailSink {
    config: EmailSinkConfig,
    from: Mailbox,
    to: Mailbox,
    templates: Handlebars<'static>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSink {
    /// Create an email sink, loading the template from `config.template`.
    pub fn new(config: EmailSinkConfig, password: SecretString) -> ParleyResult<Self> {
        let template = std::fs::read_to_string(&config.template).map_err(|e| {
            ParleyError::Configuration(format!("cannot read template {}: {}", config.template, e))
        })?;
        Self::with_template(config, password, &template)
    }

    /// Create an email sink from template source.
    pub fn with_template(
        config: EmailSinkConfig,
        password: SecretString,
        template: &str,
    ) -> ParleyResult<Self> {
        let from = parse_mailbox("emailFrom", &config.email_from)?;
        let to = parse_mailbox("emailTo", &config.email_to)?;

        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);
        templates
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| ParleyError::Template(e.to_string()))?;

        if config.skip_server_auth {
            tracing::warn!(host = %config.email_smtp_addr, "SMTP server certificate verification disabled");
        }

        let tls_parameters = TlsParameters::builder(config.email_smtp_addr.clone())
            .dangerous_accept_invalid_certs(config.skip_server_auth)
            .build()
            .map_err(|e| ParleyError::Configuration(format!("invalid SMTP TLS settings: {}", e)))?;
        let tls = if config.email_smtp_port == IMPLICIT_TLS_PORT {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Opportunistic(tls_parameters)
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
            config.email_smtp_addr.as_str(),
        )
        .port(config.email_smtp_port)
        .tls(tls)
        .credentials(Credentials::new(
            config.email_smtp_username.clone(),
            password.expose_secret().to_string(),
        ))
        .timeout(Some(config.timeout()))
        .build();

        Ok(Self {
            config,
            from,
            to,
            templates,
            transport,
        })
    }

    /// Render the message body.
    pub fn render(&self, notification: &Notification) -> ParleyResult<String> {
        let data = json!({
            "Triggers": notification.triggers,
            "Dump": serde_json::to_string_pretty(&notification.result)?,
        });
        self.templates
            .render(TEMPLATE_NAME, &data)
            .map_err(|e| ParleyError::Template(e.to_string()))
    }

    /// Build the full email.
    pub fn compose(&self, notification: &Notification) -> ParleyResult<Message> {
        let body = self.render(notification)?;
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(self.config.email_subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| ParleyError::delivery(format!("cannot build email: {}", e)))
    }
}

fn parse_mailbox(field: &str, value: &str) -> ParleyResult<Mailbox> {
    value
        .parse()
        .map_err(|e| ParleyError::Configuration(format!("invalid {} '{}': {}", field, value, e)))
}

#[async_trait]
impl NotificationSink for EmailSink {
    async fn deliver(&self, conversation_id: &str, notification: &Notification) -> ParleyResult<()> {
        let email = self.compose(notification)?;
        tracing::debug!(conversation_id = %conversation_id, to = %self.to, "Sending notification email");

        let send = || async {
            self.transport.send(email.clone()).await.map(|_| ()).map_err(|e| {
                if e.is_permanent() {
                    ParleyError::delivery(format!("SMTP rejected message: {}", e))
                } else if e.is_timeout() {
                    ParleyError::delivery_timeout(self.config.timeout())
                } else {
                    ParleyError::delivery_transport(format!("SMTP error: {}", e))
                }
            })
        };

        let policy = &self.config.retry;
        send.retry(
            ExponentialBuilder::default()
                .with_max_times(policy.max_retries as usize)
                .with_min_delay(Duration::from_millis(policy.initial_delay_ms))
                .with_max_delay(Duration::from_millis(policy.max_delay_ms))
                .with_factor(policy.multiplier),
        )
        .when(ParleyError::is_retryable)
        .notify(|err, dur| {
            tracing::warn!(
                "Email delivery via {} failed, retrying in {:?}: {}",
                self.config.email_smtp_addr,
                dur,
                err
            );
        })
        .await
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
