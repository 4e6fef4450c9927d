use groundsearch_core::{CompletionBackend, CompletionRequest, CompletionResponse, Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
/// Long reasoning + web search calls routinely take many minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_MAX_RETRIES: u32 = 2;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY_CHARS: usize = 500;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `GROUNDSEARCH_OPENAI_API_KEY`, else `OPENAI_API_KEY`. Blank values count as unset.
pub fn api_key_from_env() -> Option<String> {
    env("GROUNDSEARCH_OPENAI_API_KEY").or_else(|| env("OPENAI_API_KEY"))
}

fn base_url_from_env() -> Option<String> {
    env("GROUNDSEARCH_OPENAI_BASE_URL").or_else(|| env("OPENAI_BASE_URL"))
}

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().ok_or_else(|| {
            Error::NotConfigured("OPENAI_API_KEY environment variable is required".to_string())
        })?;
        let mut cfg = Self::new(api_key);
        if let Some(base) = base_url_from_env() {
            cfg.base_url = base;
        }
        Ok(cfg)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Responses API client. Cheap to clone; one instance serves every concurrent call.
#[derive(Debug, Clone)]
pub struct OpenAiResponsesClient {
    client: reqwest::Client,
    cfg: OpenAiConfig,
}

impl OpenAiResponsesClient {
    pub fn new(cfg: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("groundsearch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::NotConfigured(e.to_string()))?;
        Ok(Self { client, cfg })
    }

    fn endpoint_responses(&self) -> String {
        format!("{}/v1/responses", self.cfg.base_url.trim_end_matches('/'))
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.cfg
            .initial_backoff
            .saturating_mul(1u32 << retry.min(16))
            .min(MAX_BACKOFF)
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiResponsesClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse> {
        let mut retry = 0u32;
        loop {
            let sent = self
                .client
                .post(self.endpoint_responses())
                .bearer_auth(&self.cfg.api_key)
                .json(req)
                .send()
                .await;

            let resp = match sent {
                Ok(resp) => resp,
                Err(e) if is_retryable_transport(&e) && retry < self.cfg.max_retries => {
                    let delay = self.backoff(retry);
                    retry += 1;
                    warn!(
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transport error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) if e.is_timeout() => {
                    return Err(Error::Remote(format!(
                        "request timed out after {} ms",
                        self.cfg.timeout.as_millis()
                    )));
                }
                Err(e) => return Err(Error::Remote(e.to_string())),
            };

            let status = resp.status();
            if !status.is_success() {
                if is_retryable_status(status) && retry < self.cfg.max_retries {
                    let delay =
                        retry_after(resp.headers()).unwrap_or_else(|| self.backoff(retry));
                    retry += 1;
                    warn!(
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        status = status.as_u16(),
                        "retryable status, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_error(status.as_u16(), &body));
            }

            let bytes = resp.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Remote(format!(
                        "request timed out after {} ms",
                        self.cfg.timeout.as_millis()
                    ))
                } else {
                    Error::Remote(e.to_string())
                }
            })?;
            return parse_response(status.as_u16(), &bytes);
        }
    }
}

/// Refused, reset or closed-before-response connections. Timeouts are final.
fn is_retryable_transport(e: &reqwest::Error) -> bool {
    (e.is_connect() || e.is_request()) && !e.is_timeout()
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 409 | 429) || status.is_server_error()
}

/// Server-suggested delay (`retry-after-ms`, then `retry-after` seconds), if sane.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    };
    let secs = get("retry-after-ms")
        .map(|ms| ms / 1000.0)
        .or_else(|| get("retry-after"))?;
    (secs <= MAX_RETRY_AFTER.as_secs_f64()).then(|| Duration::from_secs_f64(secs))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    param: Option<String>,
}

impl ApiError {
    fn rejects_model(&self) -> bool {
        self.code.as_ref().and_then(|c| c.as_str()) == Some("model_not_found")
            || self.param.as_deref() == Some("model")
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}

/// Map a non-2xx answer to the error taxonomy, preferring the structured `error` object.
fn classify_error(status: u16, body: &str) -> Error {
    let api = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error);
    let message = api
        .as_ref()
        .and_then(|e| e.message.clone())
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let raw = body.trim();
            if raw.is_empty() {
                reqwest::StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                truncate_chars(raw, MAX_ERROR_BODY_CHARS)
            }
        });
    let text = format!("HTTP {status}: {message}");
    if api.as_ref().is_some_and(ApiError::rejects_model) {
        Error::InvalidModel(text)
    } else {
        Error::Remote(text)
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    /// Not part of the REST shape, but some compatible gateways pre-join it.
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Option<Vec<OutputItem>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Option<Vec<ContentPart>>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

fn parse_response(status: u16, bytes: &[u8]) -> Result<CompletionResponse> {
    let body: ResponsesBody =
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;
    if let Some(err) = body.error {
        let message = err.message.clone().unwrap_or_else(|| "response failed".to_string());
        let text = format!("HTTP {status}: {message}");
        return Err(if err.rejects_model() {
            Error::InvalidModel(text)
        } else {
            Error::Remote(text)
        });
    }

    let output_text = body.output_text.or_else(|| {
        let parts: Vec<String> = body
            .output
            .unwrap_or_default()
            .into_iter()
            .flat_map(|item| item.content.unwrap_or_default())
            .filter(|p| p.kind.as_deref() == Some("output_text"))
            .filter_map(|p| p.text)
            .collect();
        (!parts.is_empty()).then(|| parts.concat())
    });

    Ok(CompletionResponse { output_text })
}
