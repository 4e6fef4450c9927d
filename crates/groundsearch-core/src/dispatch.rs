//! Fallback dispatch: one call, plus at most one retry against the baseline model.

use crate::{CompletionBackend, CompletionRequest, Result, BASELINE_MODEL};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Sends composed requests through a shared backend.
///
/// The backend is built once at startup and shared by every in-flight call.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn CompletionBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Returns the plain output text (empty when the service produced none).
    ///
    /// If the service rejects the requested model and that model is not already the baseline,
    /// the same request is re-sent once with [`BASELINE_MODEL`]. The fallback's failure, if any,
    /// is what the caller sees.
    pub async fn dispatch(&self, req: &CompletionRequest) -> Result<String> {
        info!(
            backend = self.backend.name(),
            model = %req.model,
            reasoning_effort = %req.reasoning.effort,
            prompt_chars = req.input.chars().count(),
            max_output_tokens = req.max_output_tokens,
            "starting request"
        );
        if let Some(tier) = req.service_tier {
            info!(?tier, reasoning_effort = %req.reasoning.effort, "using relaxed service tier");
        }

        let t0 = Instant::now();
        let err = match self.backend.complete(req).await {
            Ok(resp) => {
                info!(elapsed_ms = t0.elapsed().as_millis() as u64, "request completed");
                return Ok(resp.output_text.unwrap_or_default());
            }
            Err(e) => e,
        };
        warn!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            error = %err,
            "request failed"
        );

        if !err.is_model_rejection() || req.model == BASELINE_MODEL {
            return Err(err);
        }

        warn!(
            requested = %req.model,
            fallback = BASELINE_MODEL,
            "model not available, falling back"
        );
        let fallback = req.with_model(BASELINE_MODEL);
        let t1 = Instant::now();
        match self.backend.complete(&fallback).await {
            Ok(resp) => {
                info!(
                    elapsed_ms = t1.elapsed().as_millis() as u64,
                    "fallback request completed"
                );
                Ok(resp.output_text.unwrap_or_default())
            }
            Err(e) => {
                warn!(
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    error = %e,
                    "fallback request failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{CompletionResponse, Error, Reasoning, ToolSpec};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays scripted outcomes and records every request it saw.
    pub(crate) struct ScriptedBackend {
        script: Mutex<VecDeque<Result<CompletionResponse>>>,
        pub(crate) seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(script: Vec<Result<CompletionResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn models(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.model.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse> {
            self.seen.lock().unwrap().push(req.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Remote("script exhausted".to_string())))
        }
    }

    pub(crate) fn text(s: &str) -> Result<CompletionResponse> {
        Ok(CompletionResponse {
            output_text: Some(s.to_string()),
        })
    }

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            input: "Today's date: 2025-01-01\nQuery: q".to_string(),
            tools: vec![ToolSpec::web_search()],
            reasoning: Reasoning {
                effort: "high".to_string(),
            },
            max_output_tokens: 16_000,
            service_tier: Some(crate::ServiceTier::Flex),
        }
    }

    #[tokio::test]
    async fn success_returns_output_text() {
        let b = ScriptedBackend::new(vec![text("Paris is the capital of France.")]);
        let d = Dispatcher::new(b.clone());
        let out = d.dispatch(&request("gpt-5")).await.unwrap();
        assert_eq!(out, "Paris is the capital of France.");
        assert_eq!(b.models(), vec!["gpt-5"]);
    }

    #[tokio::test]
    async fn missing_output_text_is_empty_string() {
        let b = ScriptedBackend::new(vec![Ok(CompletionResponse::default())]);
        let d = Dispatcher::new(b);
        assert_eq!(d.dispatch(&request("gpt-5")).await.unwrap(), "");
    }

    #[tokio::test]
    async fn model_rejection_falls_back_once_with_same_fields() {
        let b = ScriptedBackend::new(vec![
            Err(Error::Remote(
                "HTTP 404: The model `gpt-5-nano` does not exist".to_string(),
            )),
            text("fallback answer"),
        ]);
        let d = Dispatcher::new(b.clone());
        let out = d.dispatch(&request("gpt-5-nano")).await.unwrap();
        assert_eq!(out, "fallback answer");
        assert_eq!(b.models(), vec!["gpt-5-nano", BASELINE_MODEL]);

        let seen = b.seen.lock().unwrap();
        assert_eq!(seen[1], seen[0].with_model(BASELINE_MODEL));
    }

    #[tokio::test]
    async fn structured_rejection_falls_back_even_without_keyword() {
        let b = ScriptedBackend::new(vec![
            Err(Error::InvalidModel("HTTP 400: not found".to_string())),
            text("ok"),
        ]);
        let d = Dispatcher::new(b.clone());
        assert_eq!(d.dispatch(&request("o3-deep-research")).await.unwrap(), "ok");
        assert_eq!(b.models().len(), 2);
    }

    #[tokio::test]
    async fn failed_fallback_propagates_without_looping() {
        let b = ScriptedBackend::new(vec![
            Err(Error::InvalidModel("unknown model".to_string())),
            Err(Error::Remote("HTTP 503: model overloaded".to_string())),
            text("never reached"),
        ]);
        let d = Dispatcher::new(b.clone());
        let err = d.dispatch(&request("gpt-5")).await.unwrap_err();
        assert_eq!(err, Error::Remote("HTTP 503: model overloaded".to_string()));
        assert_eq!(b.models(), vec!["gpt-5", BASELINE_MODEL]);
    }

    #[tokio::test]
    async fn other_failures_do_not_fall_back() {
        for err in [
            Error::Remote("HTTP 401: Incorrect API key provided".to_string()),
            Error::Remote("error sending request: operation timed out".to_string()),
            Error::Decode("expected value at line 1 column 1".to_string()),
        ] {
            let b = ScriptedBackend::new(vec![Err(err.clone()), text("never reached")]);
            let d = Dispatcher::new(b.clone());
            assert_eq!(d.dispatch(&request("gpt-5")).await.unwrap_err(), err);
            assert_eq!(b.models(), vec!["gpt-5"]);
        }
    }

    #[tokio::test]
    async fn baseline_model_rejection_does_not_retry() {
        let b = ScriptedBackend::new(vec![
            Err(Error::InvalidModel("model disabled for org".to_string())),
            text("never reached"),
        ]);
        let d = Dispatcher::new(b.clone());
        assert!(d.dispatch(&request(BASELINE_MODEL)).await.is_err());
        assert_eq!(b.models(), vec![BASELINE_MODEL]);
    }
}
