//! Pipeline integration tests.
//!
//! Verifies that the tokenizer, tagger, registry and dispatcher work
//! together the way the front-end drives them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use abot_core::nlp::{normalize_pattern, tokenize};
use abot_core::{Classifier, DispatchOutcome, Dispatcher, PluginConnection, PluginConnector, Registry, Tagger};
use abot_types::{Field, FlexIdType, PluginMessage, Result, Session, SessionKey, StructuredInput};

struct Fixed(&'static str);

#[async_trait]
impl PluginConnector for Fixed {
    async fn connect(&self, _address: &str) -> Result<Arc<dyn PluginConnection>> {
        Ok(Arc::new(Fixed(self.0)))
    }
}

#[async_trait]
impl PluginConnection for Fixed {
    async fn respond_to(&self, _message: &PluginMessage) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn session() -> Session {
    Session::new(SessionKey::new(FlexIdType::Phone, "+15551234567").unwrap())
}

/// Test 1: a seeded tagger routes a bare noun to the plugin subscribed to it.
#[tokio::test]
async fn test_utterance_reaches_subscribed_plugin() {
    let registry = Arc::new(Registry::new());
    registry.register("weather", "mem:weather").unwrap();
    let pattern = StructuredInput::new().with(Field::Object, "Weather");
    registry.subscribe("weather", normalize_pattern(&pattern)).unwrap();

    let tagger = Tagger::seeded().unwrap();
    let tagged = tagger.classify(&tokenize("weather")).unwrap();

    let dispatcher = Dispatcher::new(registry, Arc::new(Fixed("sunny")), Duration::from_secs(1));
    let outcome = dispatcher
        .dispatch(&mut session(), &tagged.input, "weather")
        .await;
    assert_eq!(
        outcome,
        DispatchOutcome::Reply {
            plugin: "weather".into(),
            reply: "sunny".into(),
            followup: false,
        }
    );
}

/// Test 2: a model written to disk tags exactly like the one in memory.
#[test]
fn test_saved_model_tags_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("intent.bin");
    let tagger = Tagger::seeded().unwrap();
    tagger.classifier().save(&path).unwrap();

    let loaded = Tagger::from_classifier(Classifier::load(&path).unwrap()).unwrap();
    for sentence in ["get the weather today", "play some music", "call mom tomorrow"] {
        let tokens = tokenize(sentence);
        assert_eq!(
            loaded.classify(&tokens).unwrap(),
            tagger.classify(&tokens).unwrap(),
            "{sentence}"
        );
    }
}

/// Test 3: an utterance nobody subscribes to gets no handler.
#[tokio::test]
async fn test_unmatched_utterance_has_no_handler() {
    let registry = Arc::new(Registry::new());
    registry.register("music", "mem:music").unwrap();
    registry
        .subscribe("music", StructuredInput::new().with(Field::Object, "music"))
        .unwrap();

    let tagger = Tagger::seeded().unwrap();
    let tagged = tagger.classify(&tokenize("weather")).unwrap();
    let dispatcher = Dispatcher::new(registry, Arc::new(Fixed("la la")), Duration::from_secs(1));
    let outcome = dispatcher.dispatch(&mut session(), &tagged.input, "weather").await;
    assert_eq!(outcome, DispatchOutcome::NoHandler);
}
