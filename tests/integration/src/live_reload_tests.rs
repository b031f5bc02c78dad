//! Background watchers: file edits, remote polling and retry after outages.

mod support;

use std::time::Duration;

use conf_core::{ConfigEngine, ConfigPath, EngineSettings};
use conf_test_utils::TestLayers;
use pretty_assertions::assert_eq;
use serde_json::json;
use support::Backend;

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn saved_user_edit_reaches_subscribers() {
    let layers = TestLayers::new();
    let engine = ConfigEngine::start(layers.settings()).await.unwrap();
    let mut listener = engine.subscribe("listener").unwrap();
    let mut stt = engine.subscribe("stt").unwrap();
    let watchers = engine.spawn_watchers();

    let mut document = conf_fs::Tree::new();
    ConfigPath::parse("listener.wake_word")
        .unwrap()
        .set_in(&mut document, json!("hey computer"))
        .unwrap();
    conf_fs::save_document(&layers.user_path(), &document).unwrap();

    let event = tokio::time::timeout(WAIT, listener.recv())
        .await
        .expect("no change event")
        .unwrap();
    assert_eq!(
        event.paths.into_iter().collect::<Vec<_>>(),
        vec![ConfigPath::parse("listener.wake_word").unwrap()]
    );
    assert_eq!(
        engine.accessor().get("listener.wake_word"),
        Some(json!("hey computer"))
    );
    assert_eq!(stt.try_recv(), None);

    watchers.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_poll_publishes_backend_changes() {
    let backend = Backend::start().await;
    backend.serve_json(json!({"optIn": false}), None);
    let layers = TestLayers::new();
    let path = layers.write_settings(&format!(
        "[remote]\nurl = \"{}\"\npoll_interval_secs = 1\n",
        backend.url()
    ));
    let engine = ConfigEngine::start(EngineSettings::load(&path).unwrap())
        .await
        .unwrap();
    let mut opt_in = engine.subscribe("opt_in").unwrap();
    let watchers = engine.spawn_watchers();

    backend.serve_json(json!({"optIn": true}), None);

    let event = tokio::time::timeout(WAIT, opt_in.recv())
        .await
        .expect("remote change not picked up")
        .unwrap();
    assert!(event.generation > 1);
    assert_eq!(engine.accessor().get("opt_in"), Some(json!(true)));

    watchers.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_polls_retry_quickly_then_recover() {
    let backend = Backend::start().await;
    backend.serve_status(503);
    let layers = TestLayers::new();
    let path = layers.write_settings(&format!(
        "[remote]\nurl = \"{}\"\npoll_interval_secs = 1\nbackoff_initial_ms = 50\nbackoff_max_secs = 1\n",
        backend.url()
    ));
    let engine = ConfigEngine::start(EngineSettings::load(&path).unwrap())
        .await
        .unwrap();
    assert!(!engine.remote_healthy());
    let watchers = engine.spawn_watchers();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    // One fetch at startup, one at the first poll, then backoff retries
    // well inside the poll interval.
    assert!(backend.requests() >= 4, "only {} requests", backend.requests());

    backend.serve_json(json!({"lang": "pt-br"}), None);
    tokio::time::timeout(WAIT, async {
        while !engine.remote_healthy() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("remote never recovered");
    assert_eq!(engine.accessor().get("lang"), Some(json!("pt-br")));

    watchers.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_leaves_a_consistent_snapshot() {
    let layers = TestLayers::new();
    layers.write_user(&json!({"time_format": "full"}));
    let engine = ConfigEngine::start(layers.settings()).await.unwrap();
    let watchers = engine.spawn_watchers();

    layers.write_user(&json!({"time_format": "half", "date_format": "DMY"}));
    watchers.shutdown().await;

    let snapshot = engine.snapshot();
    let value = |path: &str| snapshot.get(&ConfigPath::parse(path).unwrap()).cloned();
    let state = (value("time_format"), value("date_format"));
    assert!(
        state == (Some(json!("half")), Some(json!("DMY")))
            || state == (Some(json!("full")), Some(json!("MDY"))),
        "snapshot mixes two user files: {state:?}"
    );
}
