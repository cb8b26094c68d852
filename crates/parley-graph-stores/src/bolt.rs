//! Bolt graph store implementation.
//! Serves both Neo4j and Memgraph, which speak the same protocol.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, ConfigBuilder, Graph, Query, Row};
use secrecy::{ExposeSecret, SecretString};

use parley_core::cache::MessageAuthor;
use parley_core::config::{secret_from_env, GRAPH_STORE_PASSWORD_ENV};
use parley_core::error::{ParleyError, ParleyResult};
use parley_core::traits::{
    GraphStoreConfig, IdentityKey, InsightGraphStore, MatchSource, PriorMatch, PriorMatchQuery,
    WindowCountQuery,
};

const CONVERSATION_INDEX: &str = "#conversation_index#";

const PRIOR_COLUMNS: &str = r#"
RETURN x.value AS match_value, n.#id_property# AS message_id, n.content AS content,
       u.userId AS user_id, u.name AS user_name, u.email AS user_email,
       toString(x.created) AS created
ORDER BY x.created DESC LIMIT $limit
"#;

const TOPIC_PRIOR: &str = r#"
MATCH (t:Topic)-[x:TOPIC_MESSAGE_REF]-(n:Message)-[y:SPOKE]-(u:User)
WHERE x.#conversation_index# <> $conversation_id AND y.#conversation_index# <> $conversation_id
  AND t.value = $topic_phrases
"#;

const TRACKER_MESSAGE_PRIOR: &str = r#"
MATCH (t:Tracker)-[x:TRACKER_MESSAGE_REF]-(n:Message)-[y:SPOKE]-(u:User)
WHERE x.#conversation_index# <> $conversation_id AND y.#conversation_index# <> $conversation_id
  AND t.name = $tracker_name
"#;

const TRACKER_INSIGHT_PRIOR: &str = r#"
MATCH (t:Tracker)-[x:TRACKER_INSIGHT_REF]-(n:Insight)-[y:SPOKE]-(u:User)
WHERE x.#conversation_index# <> $conversation_id AND y.#conversation_index# <> $conversation_id
  AND t.name = $tracker_name
"#;

const ENTITY_PRIOR: &str = r#"
MATCH (e:Entity)-[x:ENTITY_MESSAGE_REF]-(n:Message)-[y:SPOKE]-(u:User)
WHERE x.#conversation_index# <> $conversation_id AND y.#conversation_index# <> $conversation_id
  AND e.category = $entity_category AND e.type = $entity_type
  AND e.subType = $entity_subtype AND e.value = $entity_value
"#;

const TOPIC_COUNT: &str = r#"
MATCH (t:Topic)-[x:TOPIC_MESSAGE_REF]-(m:Message)
WHERE x.#conversation_index# <> $conversation_id AND t.value = $topic_phrases
  AND x.created > datetime($since)
RETURN count(x) AS total
"#;

const TRACKER_COUNT: &str = r#"
MATCH (t:Tracker)-[x:TRACKER_MESSAGE_REF]-(m:Message)
WHERE x.#conversation_index# <> $conversation_id AND t.name = $tracker_name
  AND x.created > datetime($since)
RETURN count(x) AS total
"#;

const ENTITY_COUNT: &str = r#"
MATCH (e:Entity)-[x:ENTITY_MESSAGE_REF]-(m:Message)
WHERE x.#conversation_index# <> $conversation_id AND e.category = $entity_category
  AND e.type = $entity_type AND e.subType = $entity_subtype AND e.value = $entity_value
  AND x.created > datetime($since)
RETURN count(x) AS total
"#;

/// Insight graph store reached over Bolt.
pub struct BoltInsightGraph {
    graph: Graph,
    conversation_index: String,
}

impl BoltInsightGraph {
    /// Connect using the given configuration.
    pub async fn connect(config: &GraphStoreConfig) -> ParleyResult<Self> {
        let conversation_index = validate_index(&config.conversation_index)?;

        let (user, password) = match &config.username {
            Some(user) => (user.clone(), secret_from_env(GRAPH_STORE_PASSWORD_ENV)?),
            None => (String::new(), SecretString::from(String::new())),
        };

        let mut builder = ConfigBuilder::default()
            .uri(config.url.as_str())
            .user(user.as_str())
            .password(password.expose_secret());
        if let Some(database) = &config.database {
            builder = builder.db(database.as_str());
        }
        let bolt_config = builder
            .build()
            .map_err(|e| ParleyError::Configuration(format!("Invalid graph store config: {}", e)))?;

        let graph = Graph::connect(bolt_config).await.map_err(|e| {
            ParleyError::graph_connection(format!("Failed to connect to {}: {}", config.url, e))
        })?;

        tracing::info!(url = %config.url, provider = ?config.provider, "Connected to graph store");
        Ok(Self {
            graph,
            conversation_index,
        })
    }

    fn render(&self, template: &str) -> String {
        render_query(template, &self.conversation_index)
    }

    async fn rows(&self, q: Query) -> ParleyResult<Vec<Row>> {
        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| ParleyError::graph_query_source(format!("Failed to run query: {}", e), e))?;

        let mut rows = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| ParleyError::graph_query_source(format!("Failed to fetch row: {}", e), e))?
        {
            rows.push(row);
        }
        Ok(rows)
    }
}

#[async_trait]
impl InsightGraphStore for BoltInsightGraph {
    async fn prior_matches(&self, request: &PriorMatchQuery) -> ParleyResult<Vec<PriorMatch>> {
        let Some(template) = prior_template(&request.identity, request.source) else {
            return Ok(Vec::new());
        };

        let q = bind_identity(
            query(&self.render(&template)),
            &request.identity,
        )
        .param("conversation_id", request.conversation_id.clone())
        .param("limit", request.limit as i64);

        let rows = self.rows(q).await?;
        tracing::debug!(
            conversation_id = %request.conversation_id,
            correlation = %request.identity.correlation(),
            rows = rows.len(),
            "Fetched prior matches"
        );
        Ok(rows.iter().map(prior_from_row).collect())
    }

    async fn count_matches(&self, request: &WindowCountQuery) -> ParleyResult<u64> {
        let q = bind_identity(
            query(&self.render(count_template(&request.identity))),
            &request.identity,
        )
        .param("conversation_id", request.conversation_id.clone())
        .param("since", request.since.to_rfc3339());

        let rows = self.rows(q).await?;
        count_from_rows(&rows)
    }
}

fn validate_index(index: &str) -> ParleyResult<String> {
    let valid = !index.is_empty() && index.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ParleyError::Configuration(format!(
            "conversationIndex must be a property identifier, got {:?}",
            index
        )));
    }
    Ok(index.to_string())
}

fn render_query(template: &str, conversation_index: &str) -> String {
    template.replace(CONVERSATION_INDEX, conversation_index)
}

fn count_template(identity: &IdentityKey) -> &'static str {
    match identity {
        IdentityKey::Topic { .. } => TOPIC_COUNT,
        IdentityKey::Tracker { .. } => TRACKER_COUNT,
        IdentityKey::Entity { .. } => ENTITY_COUNT,
    }
}

/// Read the `total` column. No row at all means nothing matched.
fn count_from_rows(rows: &[Row]) -> ParleyResult<u64> {
    let Some(row) = rows.first() else {
        return Ok(0);
    };
    let total = row
        .get::<i64>("total")
        .map_err(|e| ParleyError::graph_query_source(format!("Failed to read count: {}", e), e))?;
    Ok(total.max(0) as u64)
}

fn prior_template(identity: &IdentityKey, source: MatchSource) -> Option<String> {
    let (head, id_property) = match (identity, source) {
        (IdentityKey::Topic { .. }, MatchSource::Message) => (TOPIC_PRIOR, "messageId"),
        (IdentityKey::Tracker { .. }, MatchSource::Message) => (TRACKER_MESSAGE_PRIOR, "messageId"),
        (IdentityKey::Tracker { .. }, MatchSource::Insight) => (TRACKER_INSIGHT_PRIOR, "insightId"),
        (IdentityKey::Entity { .. }, MatchSource::Message) => (ENTITY_PRIOR, "messageId"),
        // Only trackers are recorded against insights.
        (_, MatchSource::Insight) => return None,
    };
    Some(format!(
        "{}{}",
        head.trim_end(),
        PRIOR_COLUMNS.replace("#id_property#", id_property)
    ))
}

fn bind_identity(q: Query, identity: &IdentityKey) -> Query {
    match identity {
        IdentityKey::Topic { phrase } => q.param("topic_phrases", phrase.clone()),
        IdentityKey::Tracker { name } => q.param("tracker_name", name.clone()),
        IdentityKey::Entity {
            category,
            entity_type,
            sub_type,
            value,
        } => q
            .param("entity_category", category.clone())
            .param("entity_type", entity_type.clone())
            .param("entity_subtype", sub_type.clone())
            .param("entity_value", value.clone()),
    }
}

fn prior_from_row(row: &Row) -> PriorMatch {
    let text = row
        .get::<String>("content")
        .ok()
        .filter(|content| !content.is_empty());
    let created = row
        .get::<String>("created")
        .ok()
        .and_then(|raw| parse_created(&raw));

    PriorMatch {
        match_value: row.get::<String>("match_value").unwrap_or_default().to_lowercase(),
        message_id: row.get::<String>("message_id").unwrap_or_default(),
        text,
        author: MessageAuthor {
            id: row.get::<String>("user_id").unwrap_or_default(),
            name: row.get::<String>("user_name").unwrap_or_default(),
            email: row.get::<String>("user_email").unwrap_or_default(),
            user_id: String::new(),
        },
        created,
    }
}

/// Parse a Cypher `toString(datetime)` value. Zone-id suffixes such as
/// `[Europe/Paris]` are dropped before parsing.
fn parse_created(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.split('[').next().unwrap_or(raw);
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_conversation_index() {
        let rendered = render_query(TOPIC_COUNT, "convId");
        assert!(rendered.contains("x.convId <> $conversation_id"));
        assert!(!rendered.contains(CONVERSATION_INDEX));
    }

    #[test]
    fn test_index_must_be_identifier() {
        assert!(validate_index("conversationId").is_ok());
        assert!(validate_index("conversation_id2").is_ok());
        assert!(validate_index("").is_err());
        assert!(validate_index("id OR 1=1").is_err());
        assert!(validate_index("x.y").is_err());
    }

    #[test]
    fn test_prior_template_selects_reference_kind() {
        let tracker = IdentityKey::tracker("Refund");

        let messages = prior_template(&tracker, MatchSource::Message).unwrap();
        assert!(messages.contains("TRACKER_MESSAGE_REF"));
        assert!(messages.contains("n.messageId AS message_id"));

        let insights = prior_template(&tracker, MatchSource::Insight).unwrap();
        assert!(insights.contains("TRACKER_INSIGHT_REF"));
        assert!(insights.contains("n.insightId AS message_id"));
        assert!(insights.contains("ORDER BY x.created DESC LIMIT $limit"));
    }

    #[test]
    fn test_insight_source_only_for_trackers() {
        assert!(prior_template(&IdentityKey::topic("pricing"), MatchSource::Insight).is_none());
        assert!(prior_template(
            &IdentityKey::entity("custom", "metal", "precious", "gold"),
            MatchSource::Insight
        )
        .is_none());
    }

    #[test]
    fn test_counts_scoped_like_prior_matches() {
        let cases = [
            (IdentityKey::topic("pricing"), "t.value = $topic_phrases"),
            (IdentityKey::tracker("Refund"), "t.name = $tracker_name"),
            (
                IdentityKey::entity("custom", "metal", "precious", "gold"),
                "e.value = $entity_value",
            ),
        ];

        for (identity, predicate) in cases {
            let prior = prior_template(&identity, MatchSource::Message).unwrap();
            let count = count_template(&identity);
            assert!(prior.contains(predicate), "prior query lacks {}", predicate);
            assert!(count.contains(predicate), "count query lacks {}", predicate);
        }
        assert!(ENTITY_COUNT.contains("e.subType = $entity_subtype"));
        assert!(!TRACKER_COUNT.contains("x.name"));
    }

    fn total_row(value: neo4rs::BoltType) -> Row {
        Row::new(
            neo4rs::BoltList::from(vec![neo4rs::BoltType::from("total")]),
            neo4rs::BoltList::from(vec![value]),
        )
    }

    #[test]
    fn test_count_reads_total_column() {
        assert_eq!(count_from_rows(&[]).unwrap(), 0);
        assert_eq!(count_from_rows(&[total_row(7_i64.into())]).unwrap(), 7);
    }

    #[test]
    fn test_undecodable_count_is_an_error() {
        let err = count_from_rows(&[total_row("seven".into())]).unwrap_err();
        assert!(matches!(err, ParleyError::GraphQuery { .. }));
        assert!(err.to_string().contains("Failed to read count"));
    }

    #[test]
    fn test_parse_created() {
        let parsed = parse_created("2024-03-01T10:15:30.123Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T10:15:30.123+00:00");

        let zoned = parse_created("2024-03-01T11:15:30+01:00[Europe/Paris]").unwrap();
        assert_eq!(zoned, parsed - chrono::Duration::milliseconds(123));

        assert!(parse_created("not a date").is_none());
    }
}
