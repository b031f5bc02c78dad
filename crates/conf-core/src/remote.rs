//! Remote layer sources
//!
//! The backend serves the REMOTE layer as a JSON mapping over HTTP(S). The
//! [`RemoteSource`] trait is the seam between the layer store and the
//! transport; [`HttpRemoteSource`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use conf_fs::Tree;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use serde_json::Value;

use crate::error::{Error, RemoteFetchError, Result};

/// Result of one remote fetch
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteFetch {
    /// New content, with the entity tag to send next time
    Modified { tree: Tree, etag: Option<String> },
    /// Content unchanged since the entity tag that was sent
    NotModified,
}

/// A source for the REMOTE layer
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch the layer. `etag` is the tag of the last successful fetch.
    async fn fetch(&self, etag: Option<&str>) -> std::result::Result<RemoteFetch, RemoteFetchError>;

    /// Human-readable location, for logs and status output.
    fn describe(&self) -> String;
}

/// Fetches the remote layer from a versioned HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpRemoteSource {
    client: reqwest::Client,
    url: reqwest::Url,
    timeout: Duration,
}

impl HttpRemoteSource {
    /// Create a source for `url`, which must be `http` or `https`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = reqwest::Url::parse(url).map_err(|e| Error::Settings {
            message: format!("invalid remote url '{url}': {e}"),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Settings {
                message: format!(
                    "remote url must use http or https scheme, got: {}",
                    url.scheme()
                ),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Settings {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch(&self, etag: Option<&str>) -> std::result::Result<RemoteFetch, RemoteFetchError> {
        let mut request = self.client.get(self.url.clone());
        if let Some(tag) = etag {
            request = request.header(IF_NONE_MATCH, tag);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteFetchError::Timeout {
                    after: self.timeout,
                }
            } else {
                RemoteFetchError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(url = %self.url, "Remote layer not modified");
            return Ok(RemoteFetch::NotModified);
        }
        if !status.is_success() {
            return Err(RemoteFetchError::Status {
                status: status.as_u16(),
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RemoteFetchError::Timeout {
                    after: self.timeout,
                }
            } else {
                RemoteFetchError::Http(e.to_string())
            }
        })?;

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(tree)) => Ok(RemoteFetch::Modified { tree, etag }),
            Ok(_) => Err(RemoteFetchError::Payload(
                "top-level value must be a mapping".into(),
            )),
            Err(e) => Err(RemoteFetchError::Payload(e.to_string())),
        }
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Rewrite mapping keys from the backend's camelCase to snake_case.
///
/// Only keys change; string values are kept as sent.
pub fn translate_keys(tree: Tree) -> Tree {
    tree.into_iter()
        .map(|(key, value)| (camel_to_snake(&key), translate_value(value)))
        .collect()
}

fn translate_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(translate_keys(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(translate_value).collect()),
        other => other,
    }
}

fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
