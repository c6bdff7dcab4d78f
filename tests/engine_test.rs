// tests/engine_test.rs — Integration test: ingestion, training triggers, skills

use std::sync::Arc;

use synapse::core::{Engine, Event, EventKind, ModelStatus};
use synapse::infra::config::Config;
use synapse::memory::{KvStore, MemoryStore};
use synapse::patterns::Pattern;

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.codebook.size = 16;
    config.codebook.seed = Some(7);
    config.plugins.workflow.enabled = false;
    config.plugins.clipboard.enabled = false;
    config
}

async fn start(config: Config) -> Engine {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    Engine::start(config, store).await.unwrap()
}

fn button(ts: i64) -> Event {
    Event::new(EventKind::Click, ts).with_feature("element_role", "button")
}

fn key(ts: i64) -> Event {
    Event::new(EventKind::Keydown, ts).with_key("a", &[])
}

/// Distinct single-use tokens; none repeats within a stream.
fn noise(i: usize, ts: i64) -> Event {
    match i {
        0 => Event::new(EventKind::Scroll, ts).with_feature("direction", "down"),
        1 => Event::new(EventKind::TabCreated, ts),
        2 => Event::new(EventKind::FormSubmit, ts),
        3 => Event::new(EventKind::PageVisibility, ts).with_value("hidden"),
        4 => Event::new(EventKind::MouseHover, ts),
        5 => Event::new(EventKind::TabRemoved, ts),
        6 => Event::new(EventKind::TabUpdated, ts),
        _ => Event::new(EventKind::MousePattern, ts).with_feature("pattern_type", "circle"),
    }
}

/// Four repetitions of click → key → click separated by noise, then filler.
fn repeated_stream() -> Vec<Event> {
    let mut events = Vec::new();
    let mut ts = 1_000;
    let mut tick = || {
        ts += 1_000;
        ts
    };
    for i in 0..4 {
        events.push(button(tick()));
        events.push(key(tick()));
        events.push(button(tick()));
        events.push(noise(i, tick()));
    }
    for i in 4..8 {
        events.push(noise(i, tick()));
    }
    events
}

#[tokio::test]
async fn test_below_threshold_never_trains() {
    let mut engine = start(quiet_config()).await;
    for (i, e) in repeated_stream().into_iter().take(19).enumerate() {
        let p = engine.process_event(e).await;
        assert!(p.is_idle(), "event {i} produced {p:?}");
    }
    let info = engine.get_model_info().await;
    assert_eq!(info.vocab_size, 0);
    assert_eq!(info.status, ModelStatus::Untrained);
    assert_eq!(info.events_seen, 19);
    assert!(engine.get_skills().await.is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn test_repeated_sequence_becomes_skill() {
    let mut engine = start(quiet_config()).await;
    for e in repeated_stream() {
        engine.process_event(e).await;
    }
    assert_eq!(engine.event_count(), 20);

    // queued behind the training job triggered by event 20
    let skills = engine.get_skills().await;
    assert_eq!(skills.len(), 1);
    assert_eq!(
        skills[0].tokens,
        vec!["click_button_general", "regular_key", "click_button_general"]
    );
    assert_eq!(skills[0].frequency, 4);

    let info = engine.get_model_info().await;
    assert_eq!(info.status, ModelStatus::Ready);
    assert_eq!(info.skills_count, 1);
    assert_eq!(info.vocab_size, 10);
    assert!(info.context_count > 0);
    assert!(engine.snapshot().is_trained());
    engine.shutdown().await;
}

#[tokio::test]
async fn test_explicit_training() {
    let mut engine = start(quiet_config()).await;
    for e in repeated_stream().into_iter().take(5) {
        engine.process_event(e).await;
    }
    assert!(engine.train_model().await.is_none());

    for e in repeated_stream().into_iter().skip(5) {
        engine.process_event(e).await;
    }
    let report = engine.train_model().await.unwrap();
    assert_eq!(report.events, 20);
    assert!(report.codebook_rebuilt);
    assert_eq!(report.skills_count, 1);
    engine.shutdown().await;
}

fn click_key_click(skills: &[Pattern]) -> u32 {
    skills
        .iter()
        .find(|p| p.tokens == ["click_button_general", "regular_key", "click_button_general"])
        .map(|p| p.frequency)
        .unwrap_or(0)
}

#[tokio::test]
async fn test_retraining_same_history_keeps_frequency() {
    let mut engine = start(quiet_config()).await;
    for e in repeated_stream() {
        engine.process_event(e).await;
    }
    assert_eq!(click_key_click(&engine.get_skills().await), 4);

    assert!(engine.train_model().await.is_some());
    assert!(engine.train_model().await.is_some());
    assert_eq!(click_key_click(&engine.get_skills().await), 4);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_frequency_grows_past_history_limit() {
    let mut config = quiet_config();
    config.training.history_limit = 20;
    let mut engine = start(config).await;

    let later = repeated_stream().into_iter().map(|mut e| {
        e.timestamp += 100_000;
        e
    });
    for e in repeated_stream().into_iter().chain(later) {
        engine.process_event(e).await;
    }
    assert!(engine.train_model().await.is_some());

    // the first four occurrences left the history long ago
    assert_eq!(click_key_click(&engine.get_skills().await), 8);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = quiet_config();
    config.features.dimension = 4;
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    assert!(Engine::start(config, store).await.is_err());
}

#[tokio::test]
async fn test_state_survives_restart() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let mut engine = Engine::start(quiet_config(), store.clone()).await.unwrap();
    for e in repeated_stream() {
        engine.process_event(e).await;
    }
    assert_eq!(engine.get_skills().await.len(), 1);
    engine.shutdown().await;

    let mut restarted = Engine::start(quiet_config(), store).await.unwrap();
    assert_eq!(restarted.get_skills().await.len(), 1);
    assert_eq!(restarted.get_model_info().await.status, ModelStatus::Ready);
    restarted.shutdown().await;
}
