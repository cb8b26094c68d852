//! Builds the enabled plugins from configuration.

use std::sync::Arc;

use parley_core::config::PluginConfig;
use parley_core::error::ParleyResult;
use parley_core::traits::MessagePublisher;
use parley_core::{
    build_sink, HistoricalCorrelator, HistoricalPlugin, InsightCallback, NotificationSink,
    StatisticalAggregator, StatisticalPlugin, TriggerPlugin,
};
use parley_graph_stores::GraphStoreFactory;

/// Create every plugin the configuration enables.
///
/// The trigger plugin is always present. The historical and statistical
/// plugins need a graph store and are skipped without one. A configured sink
/// whose secret is missing fails the whole build.
pub async fn create_plugins(
    config: &PluginConfig,
    publisher: Arc<dyn MessagePublisher>,
) -> ParleyResult<Vec<Arc<dyn InsightCallback>>> {
    let sink = create_sink(config)?;
    let mut plugins: Vec<Arc<dyn InsightCallback>> =
        vec![Arc::new(TriggerPlugin::from_config(config, sink))];

    match &config.graph {
        Some(graph) => {
            let store = GraphStoreFactory::create(graph).await?;
            plugins.push(Arc::new(HistoricalPlugin::new(
                HistoricalCorrelator::from_config(store.clone(), graph),
                publisher.clone(),
                config.cache_capacity,
            )));
            plugins.push(Arc::new(StatisticalPlugin::new(
                StatisticalAggregator::from_config(store, graph),
                publisher,
                config.cache_capacity,
            )));
        }
        None => {
            tracing::info!("No graph store configured, historical and statistical plugins disabled");
        }
    }

    Ok(plugins)
}

fn create_sink(config: &PluginConfig) -> ParleyResult<Option<Arc<dyn NotificationSink>>> {
    let (Some(sink), Some(secret)) = (&config.sink, config.sink_secret()?) else {
        tracing::info!("No notification sink configured");
        return Ok(None);
    };
    let sink = build_sink(sink, secret)?;
    tracing::info!(sink = sink.name(), "Notification sink ready");
    Ok(Some(sink))
}
