//! End-to-end conversation lifecycle through the trigger plugin.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_core::config::{RetryPolicy, WebhookSinkConfig};
use parley_core::notify::{WebhookSink, SECRET_HEADER};
use parley_core::types::{QuestionBatch, TextInsight, Topic, TopicBatch};
use parley_core::{
    dispatch, dispatch_raw, ConversationEvent, InsightPayload, Notification, NotificationSink,
    ParleyError, ParleyResult, TriggerConfig, TriggerPatterns, TriggerPlugin,
};
use secrecy::SecretString;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<(String, Notification)>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, conversation_id: &str, notification: &Notification) -> ParleyResult<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), notification.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

fn triggers() -> TriggerConfig {
    TriggerConfig {
        question_match: vec!["refund".into()],
        topic_match: vec!["(?i)pricing".into()],
        ..Default::default()
    }
}

fn event(id: &str, payload: InsightPayload) -> ConversationEvent {
    ConversationEvent::new(id, payload)
}

/// Every trigger recorded between init and teardown is delivered exactly once.
#[tokio::test]
async fn test_full_conversation_delivers_all_triggers() {
    let sink = Arc::new(RecordingSink::default());
    let plugin = TriggerPlugin::new(TriggerPatterns::compile(&triggers()), Some(sink.clone()), 100);

    dispatch(&plugin, &event("c1", InsightPayload::ConversationInit)).await.unwrap();
    dispatch_raw(
        &plugin,
        br#"{"conversationId":"c1","payload":{"type":"messages","messages":[
            {"id":"m1","text":"I need a refund","from":{"id":"u1","name":"Alice"}}
        ]}}"#,
    )
    .await
    .unwrap();
    dispatch(
        &plugin,
        &event(
            "c1",
            InsightPayload::Questions(QuestionBatch {
                questions: vec![TextInsight::new("q1", "I need a refund")],
            }),
        ),
    )
    .await
    .unwrap();
    dispatch(
        &plugin,
        &event(
            "c1",
            InsightPayload::Topics(TopicBatch {
                topics: vec![Topic::new("Pricing", vec![])],
            }),
        ),
    )
    .await
    .unwrap();
    let last_topics = TopicBatch {
        topics: vec![Topic::new("shipping", vec![])],
    };
    dispatch(&plugin, &event("c1", InsightPayload::Topics(last_topics.clone())))
        .await
        .unwrap();

    dispatch(&plugin, &event("c1", InsightPayload::ConversationTeardown))
        .await
        .unwrap();

    let delivered = sink.delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    let (conversation_id, notification) = &delivered[0];
    assert_eq!(conversation_id, "c1");
    assert_eq!(
        notification.triggers,
        vec![
            "Question - I need a refund".to_string(),
            "Topic - Pricing".to_string()
        ]
    );
    assert_eq!(notification.result.topic_result, Some(last_topics));
    assert!(notification.result.message_result.is_some());

    let err = dispatch(&plugin, &event("c1", InsightPayload::ConversationTeardown))
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::ConversationNotFound { .. }));
}

/// A quiet conversation sends nothing and is still removed.
#[tokio::test]
async fn test_quiet_conversation_sends_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let plugin = TriggerPlugin::new(TriggerPatterns::compile(&triggers()), Some(sink.clone()), 100);

    dispatch(&plugin, &event("quiet", InsightPayload::ConversationInit)).await.unwrap();
    dispatch(
        &plugin,
        &event(
            "quiet",
            InsightPayload::Questions(QuestionBatch {
                questions: vec![TextInsight::new("q1", "no match here")],
            }),
        ),
    )
    .await
    .unwrap();
    dispatch(&plugin, &event("quiet", InsightPayload::ConversationTeardown))
        .await
        .unwrap();

    assert!(sink.delivered.lock().unwrap().is_empty());
    assert!(plugin.registry().is_empty());
}

/// Events for a conversation that was never initialized are rejected.
#[tokio::test]
async fn test_events_before_init_are_rejected() {
    let plugin = TriggerPlugin::new(TriggerPatterns::compile(&triggers()), None, 100);
    let err = dispatch(
        &plugin,
        &event(
            "ghost",
            InsightPayload::Questions(QuestionBatch {
                questions: vec![TextInsight::new("q1", "refund")],
            }),
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ParleyError::ConversationNotFound { .. }));
    assert!(plugin.registry().is_empty());
}

/// Concurrent conversations do not see each other's triggers.
#[tokio::test]
async fn test_concurrent_conversations_are_isolated() {
    let sink = Arc::new(RecordingSink::default());
    let plugin = Arc::new(TriggerPlugin::new(
        TriggerPatterns::compile(&triggers()),
        Some(sink.clone()),
        100,
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let plugin = plugin.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("conv-{}", i);
            dispatch(plugin.as_ref(), &event(&id, InsightPayload::ConversationInit))
                .await
                .unwrap();
            let questions = (0..=i)
                .map(|n| TextInsight::new(format!("q{}", n), format!("refund #{}", n)))
                .collect();
            dispatch(
                plugin.as_ref(),
                &event(&id, InsightPayload::Questions(QuestionBatch { questions })),
            )
            .await
            .unwrap();
            dispatch(plugin.as_ref(), &event(&id, InsightPayload::ConversationTeardown))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let delivered = sink.delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 8);
    for (conversation_id, notification) in delivered {
        let i: usize = conversation_id.trim_start_matches("conv-").parse().unwrap();
        assert_eq!(notification.triggers.len(), i + 1);
    }
}

/// Teardown posts to `{webhookURI}/{conversation_id}` with the shared secret.
#[tokio::test]
async fn test_teardown_posts_to_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/webhook/c-77"))
        .and(header(SECRET_HEADER, "shared"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = WebhookSinkConfig::new(format!("{}/v1/webhook", server.uri()));
    config.retry = RetryPolicy::none();
    let sink = WebhookSink::new(config, SecretString::from("shared".to_string())).unwrap();
    let plugin = TriggerPlugin::new(TriggerPatterns::compile(&triggers()), Some(Arc::new(sink)), 100);

    dispatch(&plugin, &event("c-77", InsightPayload::ConversationInit)).await.unwrap();
    dispatch(
        &plugin,
        &event(
            "c-77",
            InsightPayload::Questions(QuestionBatch {
                questions: vec![TextInsight::new("q1", "refund please")],
            }),
        ),
    )
    .await
    .unwrap();
    dispatch(&plugin, &event("c-77", InsightPayload::ConversationTeardown))
        .await
        .unwrap();
}
