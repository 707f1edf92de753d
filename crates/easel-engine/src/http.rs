use std::sync::Arc;
use std::thread;
use std::time::Duration;

use easel_contracts::error::RETRYABLE_STATUSES;
use easel_contracts::{EaselError, Result};
use serde_json::Value;

use crate::multipart::MultipartBody;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
pub const POLL_TIMEOUT: Duration = Duration::from_secs(60);

const ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireBody {
    Empty,
    Json(Value),
    Multipart(MultipartBody),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: WireBody,
    pub timeout: Duration,
}

impl WireRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: WireBody::Empty,
            timeout: POLL_TIMEOUT,
        }
    }

    pub fn post_json(url: impl Into<String>, payload: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: WireBody::Json(payload),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn post_multipart(url: impl Into<String>, body: MultipartBody) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), body.content_type())],
            body: WireBody::Multipart(body),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            WireBody::Json(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn multipart(&self) -> Option<&MultipartBody> {
        match &self.body {
            WireBody::Multipart(body) => Some(body),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Structured `error.message` when present, otherwise the status line and
    /// a truncated body.
    pub fn error_message(&self) -> String {
        let structured = serde_json::from_slice::<Value>(&self.body)
            .ok()
            .and_then(|payload| {
                payload
                    .get("error")
                    .and_then(|error| {
                        error
                            .get("message")
                            .and_then(Value::as_str)
                            .or_else(|| error.as_str())
                    })
                    .map(str::to_string)
            })
            .filter(|message| !message.trim().is_empty());
        if let Some(message) = structured {
            return message;
        }
        let body = self.text();
        let body = body.trim();
        if body.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            format!("HTTP {}: {}", self.status, truncate_text(body, ERROR_BODY_CHARS))
        }
    }
}

/// One request/response exchange. Transport failures map to
/// [`EaselError::Network`]; any HTTP status is a successful exchange.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &WireRequest) -> Result<WireResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Certificates are always verified; the proxy, when given, covers both
    /// http and https.
    pub fn new(proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT);
        if let Some(proxy_url) = proxy.map(str::trim).filter(|value| !value.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|err| {
                EaselError::Config(format!("invalid proxy url '{proxy_url}': {err}"))
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|err| EaselError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &WireRequest) -> Result<WireResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            WireBody::Empty => builder,
            WireBody::Json(payload) => builder.body(
                serde_json::to_vec(payload)
                    .map_err(|err| EaselError::Decode(format!("unserializable payload: {err}")))?,
            ),
            WireBody::Multipart(body) => builder.body(body.as_bytes().to_vec()),
        };

        let response = builder
            .send()
            .map_err(|err| EaselError::Network(format!("{} ({err})", request.url)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| EaselError::Network(format!("reading {} failed ({err})", request.url)))?
            .to_vec();
        Ok(WireResponse { status, body })
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Wait after the zero-based `attempt` failed: `2^attempt * base`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }
}

#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            transport,
            sleeper,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn sleep(&self, duration: Duration) {
        self.sleeper.sleep(duration);
    }

    /// Sends with retry on transport failures and transient statuses and
    /// parses the JSON reply.
    pub fn send(&self, request: &WireRequest) -> Result<Value> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let err = match self.transport.execute(request) {
                Ok(response) if response.is_success() => return parse_json(&response),
                Ok(response) => EaselError::provider(Some(response.status), response.error_message()),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt + 1 >= max_attempts {
                return Err(err);
            }
            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                url = %request.url,
                attempt = attempt + 1,
                max_attempts,
                delay_s = delay.as_secs_f64(),
                error = %err,
                "retrying request"
            );
            self.sleeper.sleep(delay);
            attempt += 1;
        }
    }

    pub fn get_json(&self, url: &str, headers: &[(String, String)]) -> Result<Value> {
        let mut request = WireRequest::get(url);
        request.headers.extend(headers.iter().cloned());
        let response = self.transport.execute(&request)?;
        if !response.is_success() {
            return Err(EaselError::provider(
                Some(response.status),
                response.error_message(),
            ));
        }
        parse_json(&response)
    }

    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.transport.execute(&WireRequest::get(url))?;
        if !response.is_success() {
            return Err(EaselError::provider(
                Some(response.status),
                format!("image download failed: {}", response.error_message()),
            ));
        }
        if response.body.is_empty() {
            return Err(EaselError::Decode(format!("empty image download from {url}")));
        }
        Ok(response.body)
    }
}

fn parse_json(response: &WireResponse) -> Result<Value> {
    serde_json::from_slice(&response.body).map_err(|err| {
        EaselError::Decode(format!(
            "invalid JSON payload ({err}): {}",
            truncate_text(&response.text(), ERROR_BODY_CHARS)
        ))
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
