//! End-to-end resolution scenarios: embedded defaults, an HTTP backend,
//! and checked-in system/user documents, wired up from a settings file.

mod support;

use std::sync::Arc;

use conf_core::{ConfigEngine, EngineSettings, Layer};
use conf_test_utils::TestLayers;
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{Backend, fixture};

fn kitchen_unit(backend: &Backend, extra: &str) -> (TestLayers, EngineSettings) {
    let layers = TestLayers::new();
    layers.install_system(&fixture("system.conf"));
    layers.install_user(&fixture("user.conf"));
    let path = layers.write_settings(&format!(
        "[remote]\nurl = \"{}\"\ntimeout_secs = 2\n\n{extra}",
        backend.url()
    ));
    let settings = EngineSettings::load(&path).unwrap();
    (layers, settings)
}

fn backend_payload() -> serde_json::Value {
    json!({
        "logLevel": "DEBUG",
        "optIn": true,
        "listener": {"wakeWord": "hey backend", "phonemeDuration": 200},
        "server": {"url": "https://elsewhere.example"},
        "tts": {"module": "google"}
    })
}

async fn start(settings: EngineSettings) -> Arc<ConfigEngine> {
    ConfigEngine::start(settings).await.unwrap()
}

#[tokio::test]
async fn every_value_resolves_from_the_right_layer() {
    let backend = Backend::start().await;
    backend.serve_json(backend_payload(), None);
    let (_layers, settings) = kitchen_unit(&backend, "");

    let engine = start(settings).await;
    let config = engine.accessor();

    let expected = [
        ("system_unit", json!("english"), Layer::User),
        ("time_format", json!("full"), Layer::User),
        ("listener.wake_word", json!("hey kitchen"), Layer::User),
        ("skills.blacklisted_skills", json!(["assistant-news"]), Layer::User),
        ("log_level", json!("INFO"), Layer::System),
        ("data_dir", json!("/var/lib/assistant"), Layer::System),
        ("listener.multiplier", json!(1.4), Layer::System),
        ("tts.pulse_duck", json!(true), Layer::System),
        ("opt_in", json!(true), Layer::Remote),
        ("listener.phoneme_duration", json!(200), Layer::Remote),
        ("tts.module", json!("google"), Layer::Remote),
        ("server.url", json!("https://api.example.org"), Layer::Default),
        ("stt.module", json!("assistant"), Layer::Default),
        ("listener.sample_rate", json!(16000), Layer::Default),
    ];
    for (path, value, layer) in expected {
        assert_eq!(config.get(path), Some(value), "{path}");
        assert_eq!(config.provenance(path), Some(layer), "{path}");
    }
}

#[tokio::test]
async fn backend_alone_cannot_set_log_level() {
    let backend = Backend::start().await;
    backend.serve_json(json!({"logLevel": "DEBUG"}), None);
    let layers = TestLayers::new();
    let path = layers.write_settings(&format!("[remote]\nurl = \"{}\"\n", backend.url()));

    let engine = start(EngineSettings::load(&path).unwrap()).await;

    assert_eq!(engine.accessor().get("log_level"), None);
}

#[tokio::test]
async fn policy_table_in_settings_restricts_further() {
    let backend = Backend::start().await;
    backend.serve_json(backend_payload(), None);
    let (_layers, settings) = kitchen_unit(
        &backend,
        "[policy]\n\"listener.wake_word\" = [\"default\", \"system\"]\n",
    );

    let engine = start(settings).await;

    assert_eq!(
        engine.accessor().get("listener.wake_word"),
        Some(json!("hey assistant"))
    );
    assert_eq!(
        engine.accessor().provenance("listener.wake_word"),
        Some(Layer::Default)
    );
}

#[tokio::test]
async fn backend_outage_keeps_last_fetched_values() {
    let backend = Backend::start().await;
    backend.serve_json(backend_payload(), None);
    let (_layers, settings) = kitchen_unit(&backend, "");
    let engine = start(settings).await;

    backend.serve_status(503);
    let report = engine.invalidate_remote().await.unwrap().unwrap();

    assert_eq!(report.source_errors.len(), 1);
    assert!(report.changed.is_empty());
    assert_eq!(engine.accessor().get("opt_in"), Some(json!(true)));
    assert!(!engine.remote_healthy());
    let status = engine.layer_status().await;
    assert!(status[1].stale);
    assert!(status[1].last_error.as_deref().unwrap().contains("503"));

    backend.serve_json(json!({"optIn": false}), None);
    let report = engine.invalidate_remote().await.unwrap().unwrap();

    assert!(report.remote_refreshed);
    assert!(engine.remote_healthy());
    assert_eq!(engine.accessor().get("opt_in"), Some(json!(false)));
    assert_eq!(engine.accessor().get("listener.phoneme_duration"), Some(json!(120)));
}

#[tokio::test]
async fn unchanged_backend_answers_not_modified() {
    let backend = Backend::start().await;
    backend.serve_json(backend_payload(), Some("\"v7\""));
    let (_layers, settings) = kitchen_unit(&backend, "");
    let engine = start(settings).await;
    let before = engine.layer_status().await[1].refresh_count;

    let report = engine.invalidate_remote().await.unwrap().unwrap();

    assert_eq!(backend.requests(), 2);
    assert!(report.changed.is_empty());
    assert_eq!(engine.layer_status().await[1].refresh_count, before);
    assert_eq!(engine.accessor().get("tts.module"), Some(json!("google")));
}

#[tokio::test]
async fn unreachable_backend_at_startup_is_not_fatal() {
    let backend = Backend::start().await;
    backend.serve_status(500);
    let (_layers, settings) = kitchen_unit(&backend, "");

    let engine = start(settings).await;

    assert_eq!(engine.accessor().get("system_unit"), Some(json!("english")));
    assert_eq!(engine.accessor().get("opt_in"), Some(json!(false)));
    assert_eq!(engine.accessor().provenance("opt_in"), Some(Layer::Default));
}
