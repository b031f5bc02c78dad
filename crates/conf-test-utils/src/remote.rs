//! [`ScriptedRemote`]: a fake remote layer source.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conf_core::{RemoteFetch, RemoteFetchError, RemoteSource};
use serde_json::Value;

#[derive(Debug, Clone)]
struct Step {
    delay: Option<Duration>,
    outcome: Result<RemoteFetch, RemoteFetchError>,
}

/// Replays queued responses in order. The last response repeats once the
/// queue is drained; with nothing queued every fetch is `NotModified`.
///
/// Every method takes `&self` so responses can be queued while the engine
/// holds the source.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicUsize,
    etags: Mutex<Vec<Option<String>>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful fetch of `value` (must be a JSON object).
    pub fn respond_with(&self, value: Value) -> &Self {
        self.push(None, modified(value, None))
    }

    pub fn respond_with_etag(&self, value: Value, etag: &str) -> &Self {
        self.push(None, modified(value, Some(etag.to_string())))
    }

    /// Queue a successful fetch that takes `delay` to complete.
    pub fn respond_slowly(&self, delay: Duration, value: Value) -> &Self {
        self.push(Some(delay), modified(value, None))
    }

    pub fn not_modified(&self) -> &Self {
        self.push(None, Ok(RemoteFetch::NotModified))
    }

    pub fn fail_with(&self, error: RemoteFetchError) -> &Self {
        self.push(None, Err(error))
    }

    /// Queue a fetch that never completes within any sensible timeout.
    pub fn hang(&self) -> &Self {
        self.push(
            Some(Duration::from_secs(3600)),
            Err(RemoteFetchError::Http("unreachable".into())),
        )
    }

    /// Number of fetches started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The `If-None-Match` value passed to each fetch, in order.
    pub fn seen_etags(&self) -> Vec<Option<String>> {
        self.etags.lock().unwrap().clone()
    }

    fn push(&self, delay: Option<Duration>, outcome: Result<RemoteFetch, RemoteFetchError>) -> &Self {
        self.steps.lock().unwrap().push_back(Step { delay, outcome });
        self
    }

    fn next_step(&self) -> Option<Step> {
        let mut last = self.last.lock().unwrap();
        if let Some(step) = self.steps.lock().unwrap().pop_front() {
            *last = Some(step);
        }
        last.clone()
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn fetch(&self, etag: Option<&str>) -> Result<RemoteFetch, RemoteFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.etags.lock().unwrap().push(etag.map(str::to_owned));

        let Some(step) = self.next_step() else {
            return Ok(RemoteFetch::NotModified);
        };
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        step.outcome
    }

    fn describe(&self) -> String {
        "scripted://remote".to_string()
    }
}

fn modified(value: Value, etag: Option<String>) -> Result<RemoteFetch, RemoteFetchError> {
    match value {
        Value::Object(tree) => Ok(RemoteFetch::Modified { tree, etag }),
        other => panic!("scripted remote payload must be an object, got {other}"),
    }
}
