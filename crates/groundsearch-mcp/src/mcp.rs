use groundsearch_core::{Dispatcher, SearchRequest, SearchResult};
use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct GroundedSearchArgs {
    /// Search query for current information
    query: String,
    /// OpenAI model to use. Options: 'gpt-5', 'gpt-5-mini', 'gpt-5-nano', 'o3-2025-04-16',
    /// 'o3-deep-research', 'o4-mini-deep-research'. Deep Research models provide advanced research
    /// capabilities. Defaults to 'o3-2025-04-16'
    #[schemars(extend(
        "enum" = groundsearch_core::SUPPORTED_MODELS,
        "default" = groundsearch_core::BASELINE_MODEL
    ))]
    model: Option<String>,
    /// Reasoning effort level. Options: 'low', 'medium', 'high'. Defaults to 'low'
    #[schemars(extend("enum" = ["low", "medium", "high"], "default" = "low"))]
    reasoning_effort: Option<String>,
}

fn tool_result(r: SearchResult) -> CallToolResult {
    let content = vec![Content::text(r.text)];
    if r.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

#[derive(Clone)]
pub(crate) struct GroundSearchMcp {
    tool_router: RmcpToolRouter<Self>,
    dispatcher: Dispatcher,
}

#[tool_router]
impl GroundSearchMcp {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            tool_router: Self::tool_router(),
            dispatcher,
        }
    }

    #[tool(
        description = "Search for current information using OpenAI models (GPT-5, O3, Deep Research) with Web Search grounding. The AI can specify model and reasoning effort based on query complexity. Deep Research models provide enhanced research capabilities for complex queries."
    )]
    async fn grounded_search(
        &self,
        Parameters(args): Parameters<GroundedSearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        let req = SearchRequest {
            query: args.query,
            model: args.model,
            reasoning_effort: args.reasoning_effort,
        };
        let r = groundsearch_core::grounded_search(&self.dispatcher, &req).await;
        Ok(tool_result(r))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for GroundSearchMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "One tool, grounded_search: answers a query with an OpenAI reasoning model plus live web search. Output is plain text."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub(crate) async fn serve_stdio(dispatcher: Dispatcher) -> Result<(), McpError> {
    let svc = GroundSearchMcp::new(dispatcher);
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    info!("mcp stdio server running");
    // Keep the stdio server alive until the client closes.
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}
