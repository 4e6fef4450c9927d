use serde::{Deserialize, Serialize};

pub mod compose;
pub mod dispatch;
pub mod search;

pub use compose::{compose, compose_for_today};
pub use dispatch::Dispatcher;
pub use search::{grounded_search, SearchResult};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// The service rejected the requested model identifier.
    #[error("{0}")]
    InvalidModel(String),
    /// Network, timeout, auth, or any other non-2xx answer from the service.
    #[error("{0}")]
    Remote(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl Error {
    /// True when the failure means "this model id was not accepted".
    ///
    /// Structured classification (`InvalidModel`) wins; a `Remote` error whose message mentions
    /// `model` is treated the same way since some gateways only return free-form text.
    pub fn is_model_rejection(&self) -> bool {
        match self {
            Self::InvalidModel(_) => true,
            Self::Remote(msg) => msg.contains("model"),
            Self::NotConfigured(_) | Self::InvalidParams(_) | Self::Decode(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Model used when the caller does not pick one, and the fallback target when a pick is rejected.
pub const BASELINE_MODEL: &str = "o3-2025-04-16";

/// Model ids advertised in the tool schema. Anything else is passed through untouched.
pub const SUPPORTED_MODELS: [&str; 6] = [
    "gpt-5",
    "gpt-5-mini",
    "gpt-5-nano",
    BASELINE_MODEL,
    "o3-deep-research",
    "o4-mini-deep-research",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReasoningEffort {
    #[default]
    Low,
    Medium,
    High,
    /// Unrecognized tier; forwarded verbatim, budgeted like `Low`.
    Other(String),
}

impl ReasoningEffort {
    pub fn parse(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
    /// Cheaper, slower processing lane. Better odds of finishing long high-effort calls.
    Flex,
}

/// Output budget and processing lane derived from a reasoning effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffortProfile {
    pub max_output_tokens: u64,
    pub service_tier: Option<ServiceTier>,
}

impl EffortProfile {
    pub fn for_effort(effort: &ReasoningEffort) -> Self {
        match effort {
            ReasoningEffort::Low | ReasoningEffort::Other(_) => Self {
                max_output_tokens: 4_000,
                service_tier: None,
            },
            ReasoningEffort::Medium => Self {
                max_output_tokens: 8_000,
                service_tier: Some(ServiceTier::Flex),
            },
            ReasoningEffort::High => Self {
                max_output_tokens: 16_000,
                service_tier: Some(ServiceTier::Flex),
            },
        }
    }
}

/// A caller's search, as received from the tool boundary (defaults not yet applied).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn query_chars(&self) -> usize {
        self.query.chars().count()
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidParams("query must be non-empty".to_string()));
        }
        Ok(())
    }

    /// Requested model, verbatim, or the baseline when absent or empty.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(BASELINE_MODEL)
    }

    pub fn effort(&self) -> ReasoningEffort {
        self.reasoning_effort
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(ReasoningEffort::parse)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ToolSpec {
    pub fn web_search() -> Self {
        Self {
            kind: "web_search".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reasoning {
    pub effort: String,
}

/// Outbound completion request, shaped like the Responses API body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub input: String,
    pub tools: Vec<ToolSpec>,
    pub reasoning: Reasoning,
    pub max_output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<ServiceTier>,
}

impl CompletionRequest {
    /// Same request with only the model swapped.
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Plain output text, if the service produced any.
    pub output_text: Option<String>,
}

#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse>;
}
