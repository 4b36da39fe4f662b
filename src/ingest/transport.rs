// src/ingest/transport.rs
//! Single blocking HTTP GET, behind a trait so the executor can be driven by a
//! scripted transport in tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After` (seconds form only).
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Transport: Send + Sync {
    /// Network-level failures come back as `Timeout`/`Network`; any HTTP status
    /// (including 4xx/5xx) is a successful transport round-trip.
    fn get(&self, req: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// `reqwest::blocking` transport.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("incremental-feed-fetcher/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, req: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut builder = self
            .client
            .get(&req.url)
            .query(&req.query)
            .timeout(req.timeout);
        for (k, v) in &req.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        let resp = builder.send()?;
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text()?;
        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

type Responder = Box<dyn Fn(&HttpRequest, usize) -> Result<HttpResponse, FetchError> + Send + Sync>;

// --- Test helper ---
/// Replays queued responses in order, then falls back to a responder (default:
/// an empty page). Every request is recorded.
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
    fallback: Responder,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<HttpResponse, FetchError>>,
    {
        Self {
            queue: Mutex::new(responses.into_iter().collect()),
            fallback: Box::new(|_: &HttpRequest, _: usize| {
                Ok(HttpResponse::ok(r#"{"records":[]}"#))
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with `f(request, zero_based_call_index)`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&HttpRequest, usize) -> Result<HttpResponse, FetchError> + Send + Sync + 'static,
    {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Box::new(f),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("transport mutex poisoned").len()
    }

    pub fn recorded(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("transport mutex poisoned")
            .clone()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, req: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let idx = {
            let mut log = self.requests.lock().expect("transport mutex poisoned");
            log.push(req.clone());
            log.len() - 1
        };
        let next = self
            .queue
            .lock()
            .expect("transport mutex poisoned")
            .pop_front();
        match next {
            Some(r) => r,
            None => (self.fallback)(req, idx),
        }
    }
}
