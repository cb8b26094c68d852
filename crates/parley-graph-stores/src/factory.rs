//! Factory for creating insight graph stores.

use std::sync::Arc;

use parley_core::error::{ParleyError, ParleyResult};
use parley_core::traits::{GraphStoreConfig, GraphStoreProvider, InsightGraphStore};

/// Factory for creating insight graph stores.
pub struct GraphStoreFactory;

impl GraphStoreFactory {
    /// Create a graph store from the given configuration.
    ///
    /// Bolt providers read their password from `GRAPH_STORE_PASSWORD` when a
    /// username is configured.
    pub async fn create(config: &GraphStoreConfig) -> ParleyResult<Arc<dyn InsightGraphStore>> {
        tracing::info!(provider = ?config.provider, url = %config.url, "Creating graph store");

        match config.provider {
            #[cfg(feature = "memory")]
            GraphStoreProvider::Memory => Ok(Arc::new(crate::memory::InMemoryInsightGraph::new())),

            #[cfg(feature = "neo4j")]
            GraphStoreProvider::Neo4j => {
                let store = crate::bolt::BoltInsightGraph::connect(config).await?;
                Ok(Arc::new(store))
            }

            #[cfg(feature = "memgraph")]
            GraphStoreProvider::Memgraph => {
                let store = crate::bolt::BoltInsightGraph::connect(config).await?;
                Ok(Arc::new(store))
            }

            #[allow(unreachable_patterns)]
            provider => Err(ParleyError::Configuration(format!(
                "graph store provider {:?} is not enabled in this build",
                provider
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_create_memory_store() {
        let store = GraphStoreFactory::create(&GraphStoreConfig::default()).await;
        assert!(store.is_ok());
    }

    #[cfg(not(feature = "neo4j"))]
    #[tokio::test]
    async fn test_disabled_provider_is_configuration_error() {
        let config = GraphStoreConfig {
            provider: GraphStoreProvider::Neo4j,
            ..Default::default()
        };
        assert!(matches!(
            GraphStoreFactory::create(&config).await,
            Err(ParleyError::Configuration(_))
        ));
    }
}
