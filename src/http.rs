//! HTTP plumbing shared by every remote lookup and download.
//!
//! [`Transport`] is the seam between the pipeline and the network: the
//! production implementation wraps a blocking `reqwest` client, tests script
//! responses. [`RetryingHttpClient`] adds pacing, bounded retries with
//! exponential backoff, and the transient/permanent split.

use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::EnrichError;
use crate::rate_limit::{Clock, RateLimiter, SystemClock};

const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    url: String,
    query: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Status line plus an unread body stream.
pub struct HttpResponse {
    status: u16,
    content_type: Option<String>,
    body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: Option<String>, body: Box<dyn Read + Send>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    pub fn from_bytes(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, None, Box::new(Cursor::new(body.into())))
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn text(mut self) -> std::io::Result<String> {
        let mut bytes = Vec::new();
        self.body.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn into_body(self) -> Box<dyn Read + Send> {
        self.body
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Interrupted,
    Other,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self.kind, TransportErrorKind::Other)
    }
}

pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(service: &str, timeout: Duration) -> Result<Self, EnrichError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-enrich/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EnrichError::HttpClient {
                    service: service.to_string(),
                    message: err.to_string(),
                })?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| EnrichError::HttpClient {
                service: service.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(request.url())
            .query(request.query_pairs())
            .send()
            .map_err(|err| TransportError::new(classify_reqwest_error(&err), err.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(HttpResponse::new(status, content_type, Box::new(response)))
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_request() || err.is_body() {
        TransportErrorKind::Interrupted
    } else {
        TransportErrorKind::Other
    }
}

pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// `delay = min(base * 2^attempt, max)`; `max_retries` counts extra attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(crate::config::DEFAULT_MAX_RETRIES, &RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_settings(max_retries: u32, settings: &RetrySettings) -> Self {
        Self::new(
            max_retries,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt + 1` (attempt 0 is the first retry).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}

pub struct RetryingHttpClient<T: Transport> {
    service: String,
    transport: T,
    policy: RetryPolicy,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl<T: Transport> RetryingHttpClient<T> {
    pub fn new(
        service: impl Into<String>,
        transport: T,
        policy: RetryPolicy,
        min_interval: Duration,
    ) -> Self {
        Self::with_clock(service, transport, policy, min_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(
        service: impl Into<String>,
        transport: T,
        policy: RetryPolicy,
        min_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service: service.into(),
            transport,
            policy,
            limiter: RateLimiter::with_clock(min_interval, clock.clone()),
            clock,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request` until it succeeds, fails permanently, or the retry
    /// budget is spent. Every attempt goes through the rate limiter first.
    pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, EnrichError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.wait();
            debug!(service = %self.service, url = request.url(), attempt, "sending request");
            let failure = match self.transport.send(request) {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if is_transient_status(response.status()) => {
                    format!("status {}", response.status())
                }
                Ok(response) => {
                    let status = response.status();
                    let message = response
                        .text()
                        .map(|body| truncate(body.trim(), MAX_ERROR_BODY_CHARS))
                        .unwrap_or_else(|_| format!("{} request failed", self.service));
                    return Err(EnrichError::RemoteStatus {
                        service: self.service.clone(),
                        status,
                        message,
                    });
                }
                Err(err) if err.is_transient() => err.message,
                Err(err) => {
                    return Err(EnrichError::Transport {
                        service: self.service.clone(),
                        message: err.message,
                    });
                }
            };

            if attempt >= self.policy.max_retries() {
                return Err(EnrichError::RetriesExhausted {
                    service: self.service.clone(),
                    attempts: attempt + 1,
                    message: failure,
                });
            }
            let delay = self.policy.backoff(attempt);
            warn!(
                service = %self.service,
                url = request.url(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "transient failure ({failure}), retrying"
            );
            self.clock.sleep(delay);
            attempt += 1;
        }
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}
