//! A stand-in for the backend that serves the REMOTE layer over HTTP.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone)]
struct Reply {
    status: u16,
    body: String,
    etag: Option<String>,
}

/// Serves whatever reply is currently configured; honors `If-None-Match`.
pub struct Backend {
    url: String,
    reply: Arc<Mutex<Reply>>,
    requests: Arc<AtomicUsize>,
}

impl Backend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/device/settings", listener.local_addr().unwrap());
        let reply = Arc::new(Mutex::new(Reply {
            status: 200,
            body: "{}".to_string(),
            etag: None,
        }));
        let requests = Arc::new(AtomicUsize::new(0));

        let (shared, counter) = (Arc::clone(&reply), Arc::clone(&requests));
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let reply = Arc::clone(&shared);
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let request = String::from_utf8_lossy(&buf).to_lowercase();
                    let current = reply.lock().unwrap().clone();
                    let response = render(&request, &current);
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            url,
            reply,
            requests,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn serve_json(&self, body: serde_json::Value, etag: Option<&str>) {
        *self.reply.lock().unwrap() = Reply {
            status: 200,
            body: body.to_string(),
            etag: etag.map(str::to_owned),
        };
    }

    pub fn serve_status(&self, status: u16) {
        *self.reply.lock().unwrap() = Reply {
            status,
            body: String::new(),
            etag: None,
        };
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn render(request: &str, reply: &Reply) -> String {
    let not_modified = reply.status == 200
        && reply
            .etag
            .as_ref()
            .is_some_and(|tag| request.contains(&format!("if-none-match: {}", tag.to_lowercase())));
    let (status, body) = if not_modified {
        (304, "")
    } else {
        (reply.status, reply.body.as_str())
    };

    let mut response = format!(
        "HTTP/1.1 {status} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
        reason(status),
        body.len()
    );
    if let Some(tag) = &reply.etag {
        response.push_str(&format!("etag: {tag}\r\n"));
    }
    response.push_str("\r\n");
    response.push_str(body);
    response
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        304 => "Not Modified",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

/// Checked-in layer documents under `test-fixtures/layers`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../test-fixtures/layers")
        .join(name)
}
