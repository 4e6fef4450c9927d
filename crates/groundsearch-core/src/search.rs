use crate::{compose_for_today, Dispatcher, Error, SearchRequest};
use serde::Serialize;
use tracing::info;

/// What a single `grounded_search` call hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub text: String,
    pub is_error: bool,
}

impl SearchResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(err: &Error) -> Self {
        Self {
            text: format!("Error: OpenAI API error: {err}"),
            is_error: true,
        }
    }
}

impl From<crate::Result<String>> for SearchResult {
    fn from(r: crate::Result<String>) -> Self {
        match r {
            Ok(text) => Self::ok(text),
            Err(e) => Self::error(&e),
        }
    }
}

/// Validate, compose and dispatch one search. Never fails: errors come back as `is_error` text.
pub async fn grounded_search(dispatcher: &Dispatcher, req: &SearchRequest) -> SearchResult {
    if let Err(e) = req.validate() {
        return SearchResult {
            text: format!("Error: {e}"),
            is_error: true,
        };
    }
    info!(
        model = req.model(),
        reasoning_effort = %req.effort(),
        query_chars = req.query_chars(),
        "grounded search"
    );
    let composed = compose_for_today(req);
    dispatcher.dispatch(&composed).await.into()
}
