//! Server state management.

use std::sync::Arc;

use parley_core::config::PluginConfig;
use parley_core::error::ParleyResult;
use parley_core::{BroadcastPublisher, InsightCallback};
use secrecy::SecretString;

use crate::factory::create_plugins;

/// Environment variable holding the shared secret the sample receiver checks.
pub const RECEIVER_SECRET_ENV: &str = "PARLEY_RECEIVER_SECRET";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub plugins: Vec<Arc<dyn InsightCallback>>,
    pub publisher: BroadcastPublisher,
    pub receiver_secret: Option<SecretString>,
}

impl AppState {
    /// Create state around already-built plugins.
    pub fn new(
        plugins: Vec<Arc<dyn InsightCallback>>,
        publisher: BroadcastPublisher,
        receiver_secret: Option<SecretString>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                plugins,
                publisher,
                receiver_secret,
            }),
        }
    }

    /// Build plugins from configuration and read the receiver secret from
    /// `PARLEY_RECEIVER_SECRET`.
    pub async fn from_config(config: &PluginConfig) -> ParleyResult<Self> {
        let publisher = BroadcastPublisher::new();
        let plugins = create_plugins(config, Arc::new(publisher.clone())).await?;
        let receiver_secret = std::env::var(RECEIVER_SECRET_ENV)
            .ok()
            .filter(|secret| !secret.is_empty())
            .map(SecretString::from);

        Ok(Self::new(plugins, publisher, receiver_secret))
    }

    pub fn plugins(&self) -> &[Arc<dyn InsightCallback>] {
        &self.inner.plugins
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.inner.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn publisher(&self) -> &BroadcastPublisher {
        &self.inner.publisher
    }

    pub fn receiver_secret(&self) -> Option<&SecretString> {
        self.inner.receiver_secret.as_ref()
    }
}
