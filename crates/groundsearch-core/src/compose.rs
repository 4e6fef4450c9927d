//! Request composition: defaults, date grounding, and effort budgeting.

use crate::{CompletionRequest, EffortProfile, Reasoning, SearchRequest, ToolSpec};
use chrono::NaiveDate;

/// Prompt sent to the service: the current date on its own line, then the untouched query.
pub fn prompt_for(query: &str, today: NaiveDate) -> String {
    format!("Today's date: {}\nQuery: {query}", today.format("%Y-%m-%d"))
}

/// Build the outbound request for `req` as of `today`.
///
/// Callers are expected to have run [`SearchRequest::validate`]; composition itself never fails.
pub fn compose(req: &SearchRequest, today: NaiveDate) -> CompletionRequest {
    let effort = req.effort();
    let profile = EffortProfile::for_effort(&effort);
    CompletionRequest {
        model: req.model().to_string(),
        input: prompt_for(&req.query, today),
        tools: vec![ToolSpec::web_search()],
        reasoning: Reasoning {
            effort: effort.as_str().to_string(),
        },
        max_output_tokens: profile.max_output_tokens,
        service_tier: profile.service_tier,
    }
}

/// [`compose`] using today's UTC date.
pub fn compose_for_today(req: &SearchRequest) -> CompletionRequest {
    compose(req, chrono::Utc::now().date_naive())
}
