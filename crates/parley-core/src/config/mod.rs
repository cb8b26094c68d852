//! Configuration system for parley.
//!
//! A single document (JSON, TOML or YAML) lists the trigger patterns per
//! category, the notification sink and the optional graph store. Secrets are
//! never read from the document; they come from the environment.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::{ParleyError, ParleyResult};
use crate::traits::GraphStoreConfig;
use crate::types::InsightCategory;

/// Environment variable naming the configuration document.
pub const CONFIG_FILE_ENV: &str = "PARLEY_CONFIG_FILE";
/// Shared secret sent to the webhook endpoint.
pub const WEBHOOK_PASSWORD_ENV: &str = "WEBHOOK_PASSWORD";
/// SMTP password for the email sink.
pub const EMAIL_SMTP_PASSWORD_ENV: &str = "EMAIL_SMTP_PASSWORD";
/// Password for the graph store.
pub const GRAPH_STORE_PASSWORD_ENV: &str = "GRAPH_STORE_PASSWORD";

/// Ordered regex trigger patterns per insight category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TriggerConfig {
    pub question_match: Vec<String>,
    pub follow_up_match: Vec<String>,
    pub action_item_match: Vec<String>,
    pub topic_match: Vec<String>,
    pub tracker_match: Vec<String>,
    pub entity_match: Vec<String>,
}

impl TriggerConfig {
    /// Patterns configured for a category. Messages never trigger.
    pub fn patterns_for(&self, category: InsightCategory) -> &[String] {
        match category {
            InsightCategory::Question => &self.question_match,
            InsightCategory::FollowUp => &self.follow_up_match,
            InsightCategory::ActionItem => &self.action_item_match,
            InsightCategory::Topic => &self.topic_match,
            InsightCategory::Tracker => &self.tracker_match,
            InsightCategory::Entity => &self.entity_match,
            InsightCategory::Message => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.question_match.is_empty()
            && self.follow_up_match.is_empty()
            && self.action_item_match.is_empty()
            && self.topic_match.is_empty()
            && self.tracker_match.is_empty()
            && self.entity_match.is_empty()
    }
}

/// Retry policy for notification delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first one
    pub max_retries: u32,
    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 200,
            max_delay_ms: 2_000,
            multiplier: 2.0_f32,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_smtp_port() -> u16 {
    587
}

/// Webhook sink configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSinkConfig {
    /// Base URI; the conversation id is appended as the last path segment.
    #[serde(rename = "webhookURI")]
    pub webhook_uri: String,
    /// Accept any server certificate. Insecure.
    #[serde(default)]
    pub skip_server_auth: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl WebhookSinkConfig {
    pub fn new(webhook_uri: impl Into<String>) -> Self {
        Self {
            webhook_uri: webhook_uri.into(),
            skip_server_auth: false,
            timeout_secs: default_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Email sink configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSinkConfig {
    /// Path to the Handlebars body template.
    pub template: String,
    pub email_from: String,
    pub email_to: String,
    #[serde(default)]
    pub email_subject: String,
    pub email_smtp_addr: String,
    #[serde(
        rename = "emailPort",
        default = "default_smtp_port",
        deserialize_with = "port_from_string_or_number"
    )]
    pub email_smtp_port: u16,
    #[serde(default)]
    pub email_smtp_username: String,
    /// Accept any server certificate. Insecure.
    #[serde(default)]
    pub skip_server_auth: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl EmailSinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// SMTP port written either as a number or, in older documents, a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    fn into_port(self) -> Result<u16, String> {
        match self {
            Self::Number(port) => Ok(port),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|e| format!("invalid emailPort '{}': {}", text, e)),
        }
    }
}

fn port_from_string_or_number<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    PortValue::deserialize(deserializer)?
        .into_port()
        .map_err(serde::de::Error::custom)
}

/// Where teardown notifications are delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Webhook(WebhookSinkConfig),
    Email(EmailSinkConfig),
}

impl SinkConfig {
    /// Environment variable holding this sink's secret.
    pub fn secret_env(&self) -> &'static str {
        match self {
            Self::Webhook(_) => WEBHOOK_PASSWORD_ENV,
            Self::Email(_) => EMAIL_SMTP_PASSWORD_ENV,
        }
    }
}

/// Main plugin configuration.
///
/// Sinks are written either as a `sink` table tagged by `kind`, or with
/// their keys at the top level of the document (`webhookURI`, `template`,
/// `email*`), which is how single-sink deployments lay them out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PluginDocument")]
pub struct PluginConfig {
    /// Trigger patterns, flattened into the top-level document.
    #[serde(flatten)]
    pub triggers: TriggerConfig,
    /// Notification sink (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkConfig>,
    /// Messages retained per conversation.
    pub cache_capacity: usize,
    /// Graph store configuration (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphStoreConfig>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            triggers: TriggerConfig::default(),
            sink: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            graph: None,
        }
    }
}

/// On-disk shape of [`PluginConfig`], including the top-level sink keys.
#[derive(Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PluginDocument {
    #[serde(flatten)]
    triggers: TriggerConfig,
    sink: Option<SinkConfig>,
    cache_capacity: usize,
    graph: Option<GraphStoreConfig>,
    #[serde(flatten)]
    flat_sink: FlatSinkKeys,
}

impl Default for PluginDocument {
    fn default() -> Self {
        Self {
            triggers: TriggerConfig::default(),
            sink: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            graph: None,
            flat_sink: FlatSinkKeys::default(),
        }
    }
}

/// Sink keys written at the top level of the document.
#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FlatSinkKeys {
    #[serde(rename = "webhookURI")]
    webhook_uri: Option<String>,
    skip_server_auth: bool,
    timeout_secs: Option<u64>,
    retry: Option<RetryPolicy>,
    template: Option<String>,
    email_from: Option<String>,
    email_to: Option<String>,
    email_subject: Option<String>,
    email_smtp_addr: Option<String>,
    email_port: Option<PortValue>,
    email_smtp_username: Option<String>,
    // Accepted so older documents still load; the value is never used.
    webhook_password: Option<serde::de::IgnoredAny>,
    email_smtp_password: Option<serde::de::IgnoredAny>,
}

impl FlatSinkKeys {
    fn has_email_keys(&self) -> bool {
        self.template.is_some()
            || self.email_from.is_some()
            || self.email_to.is_some()
            || self.email_subject.is_some()
            || self.email_smtp_addr.is_some()
            || self.email_port.is_some()
            || self.email_smtp_username.is_some()
    }

    fn into_sink(self) -> ParleyResult<Option<SinkConfig>> {
        if self.webhook_password.is_some() || self.email_smtp_password.is_some() {
            tracing::warn!("Ignoring password in configuration document, secrets come from the environment");
        }

        let has_email = self.has_email_keys();
        let timeout_secs = self.timeout_secs.unwrap_or_else(default_timeout_secs);
        let retry = self.retry.unwrap_or_default();

        match self.webhook_uri {
            Some(_) if has_email => Err(ParleyError::Configuration(
                "document sets both webhookURI and email sink keys".to_string(),
            )),
            Some(webhook_uri) => Ok(Some(SinkConfig::Webhook(WebhookSinkConfig {
                webhook_uri,
                skip_server_auth: self.skip_server_auth,
                timeout_secs,
                retry,
            }))),
            None if has_email => {
                let email_smtp_port = match self.email_port {
                    Some(port) => port.into_port().map_err(ParleyError::Configuration)?,
                    None => default_smtp_port(),
                };
                Ok(Some(SinkConfig::Email(EmailSinkConfig {
                    template: required(self.template, "template")?,
                    email_from: required(self.email_from, "emailFrom")?,
                    email_to: required(self.email_to, "emailTo")?,
                    email_subject: self.email_subject.unwrap_or_default(),
                    email_smtp_addr: required(self.email_smtp_addr, "emailSmtpAddr")?,
                    email_smtp_port,
                    email_smtp_username: self.email_smtp_username.unwrap_or_default(),
                    skip_server_auth: self.skip_server_auth,
                    timeout_secs,
                    retry,
                })))
            }
            None => Ok(None),
        }
    }

    fn is_empty(&self) -> bool {
        self.webhook_uri.is_none() && !self.has_email_keys()
    }
}

fn required(value: Option<String>, key: &str) -> ParleyResult<String> {
    value.ok_or_else(|| ParleyError::Configuration(format!("{} is required for the email sink", key)))
}

impl TryFrom<PluginDocument> for PluginConfig {
    type Error = ParleyError;

    fn try_from(document: PluginDocument) -> ParleyResult<Self> {
        let sink = match document.sink {
            Some(_) if !document.flat_sink.is_empty() => {
                return Err(ParleyError::Configuration(
                    "sink is configured both under `sink` and at the top level".to_string(),
                ))
            }
            Some(sink) => Some(sink),
            None => document.flat_sink.into_sink()?,
        };

        Ok(Self {
            triggers: document.triggers,
            sink,
            cache_capacity: document.cache_capacity,
            graph: document.graph,
        })
    }
}

impl PluginConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> ParleyResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ParleyError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let ext = path.extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ParleyError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ParleyError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| ParleyError::Configuration(e.to_string()))?,
            _ => {
                return Err(ParleyError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };

        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load configuration from the file named by `PARLEY_CONFIG_FILE`.
    pub fn from_env() -> ParleyResult<Self> {
        let path = std::env::var(CONFIG_FILE_ENV)
            .map_err(|_| ParleyError::missing_secret(CONFIG_FILE_ENV))?;
        Self::from_file(path)
    }

    /// Check addresses in the sink configuration.
    ///
    /// Trigger patterns are compiled separately; a bad pattern is skipped,
    /// not fatal.
    pub fn validate(&self) -> ParleyResult<()> {
        match &self.sink {
            Some(SinkConfig::Webhook(webhook)) => {
                let uri = url::Url::parse(&webhook.webhook_uri).map_err(|e| {
                    ParleyError::Configuration(format!(
                        "invalid webhookURI '{}': {}",
                        webhook.webhook_uri, e
                    ))
                })?;
                if !matches!(uri.scheme(), "http" | "https") {
                    return Err(ParleyError::Configuration(format!(
                        "webhookURI must be http or https, got '{}'",
                        uri.scheme()
                    )));
                }
                if webhook.timeout_secs == 0 {
                    return Err(ParleyError::Configuration(
                        "webhook timeoutSecs must be greater than zero".to_string(),
                    ));
                }
            }
            Some(SinkConfig::Email(email)) => {
                for (field, value) in [("emailFrom", &email.email_from), ("emailTo", &email.email_to)] {
                    value.parse::<lettre::message::Mailbox>().map_err(|e| {
                        ParleyError::Configuration(format!("invalid {} '{}': {}", field, value, e))
                    })?;
                }
                if email.email_smtp_addr.trim().is_empty() {
                    return Err(ParleyError::Configuration(
                        "emailSmtpAddr is required".to_string(),
                    ));
                }
                if email.timeout_secs == 0 {
                    return Err(ParleyError::Configuration(
                        "email timeoutSecs must be greater than zero".to_string(),
                    ));
                }
            }
            None => {}
        }

        if let Some(graph) = &self.graph {
            if graph.query_timeout_ms == 0 {
                return Err(ParleyError::Configuration(
                    "graph queryTimeoutMs must be greater than zero".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Read the configured sink's secret from the environment.
    ///
    /// Returns `None` when no sink is configured.
    pub fn sink_secret(&self) -> ParleyResult<Option<SecretString>> {
        self.sink
            .as_ref()
            .map(|sink| secret_from_env(sink.secret_env()))
            .transpose()
    }
}

/// Read a required secret from the environment.
pub fn secret_from_env(variable: &str) -> ParleyResult<SecretString> {
    match std::env::var(variable) {
        Ok(value) if !value.is_empty() => {
            tracing::debug!(variable = %variable, "Secret found in environment");
            Ok(SecretString::from(value))
        }
        _ => {
            tracing::error!(variable = %variable, "Secret not found in environment");
            Err(ParleyError::missing_secret(variable))
        }
    }
}
