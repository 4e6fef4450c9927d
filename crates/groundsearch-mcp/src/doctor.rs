use crate::ClientArgs;
use anyhow::Result;
use serde::Serialize;

#[derive(clap::Args, Debug)]
pub(crate) struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Spawn `groundsearch mcp-stdio` as a child and call `list_tools`.
    ///
    /// No search is performed and no secret values are printed.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_stdio: bool,
    /// Timeout for the stdio handshake (ms).
    #[arg(long = "handshake-timeout-ms", default_value_t = 3000)]
    handshake_timeout_ms: u64,
    #[command(flatten)]
    client: ClientArgs,
}

#[derive(Debug, Serialize)]
struct StdioCheck {
    checked: bool,
    ok: bool,
    tools: Vec<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    ok: bool,
    name: &'static str,
    version: &'static str,
    /// Name of the variable the key was read from, never its value.
    api_key_env: Option<&'static str>,
    baseline_model: &'static str,
    supported_models: [&'static str; 6],
    base_url_overridden: bool,
    env_file_set: bool,
    timeout_ms: u64,
    max_retries: u32,
    stdio: StdioCheck,
    hints: Vec<&'static str>,
}

fn has_env(k: &str) -> bool {
    std::env::var(k)
        .ok()
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

fn api_key_env() -> Option<&'static str> {
    ["GROUNDSEARCH_OPENAI_API_KEY", "OPENAI_API_KEY"]
        .into_iter()
        .find(|k| has_env(k))
}

#[cfg(feature = "stdio")]
async fn stdio_handshake(timeout_ms: u64) -> Result<Vec<String>> {
    use rmcp::{
        service::ServiceExt,
        transport::{ConfigureCommandExt, TokioChildProcess},
    };

    let exe = std::env::current_exe()?;
    let handshake = async {
        let service = ()
            .serve(TokioChildProcess::new(
                tokio::process::Command::new(exe).configure(|cmd| {
                    cmd.arg("mcp-stdio");
                }),
            )?)
            .await?;
        let tools = service.list_tools(Default::default()).await?;
        let names = tools
            .tools
            .iter()
            .map(|t| t.name.to_string())
            .collect::<Vec<_>>();
        let _ = service.cancel().await;
        Ok::<_, anyhow::Error>(names)
    };
    tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), handshake)
        .await
        .map_err(|_| anyhow::anyhow!("stdio handshake timed out after {timeout_ms} ms"))?
}

#[cfg(not(feature = "stdio"))]
async fn stdio_handshake(_timeout_ms: u64) -> Result<Vec<String>> {
    anyhow::bail!("built without the `stdio` feature")
}

pub(crate) async fn run(args: DoctorCmd) -> Result<()> {
    let api_key_env = api_key_env();

    let stdio = if args.check_stdio && api_key_env.is_some() {
        match stdio_handshake(args.handshake_timeout_ms).await {
            Ok(tools) => StdioCheck {
                checked: true,
                ok: tools.iter().any(|t| t == "grounded_search"),
                tools,
                error: None,
            },
            Err(e) => StdioCheck {
                checked: true,
                ok: false,
                tools: Vec::new(),
                error: Some(format!("{e:#}")),
            },
        }
    } else {
        StdioCheck {
            checked: false,
            ok: false,
            tools: Vec::new(),
            error: None,
        }
    };

    let mut hints = Vec::new();
    if api_key_env.is_none() {
        hints.push(
            "Set OPENAI_API_KEY (or GROUNDSEARCH_OPENAI_API_KEY); the server refuses to start without it.",
        );
    }
    if stdio.checked && !stdio.ok {
        hints.push(
            "The stdio handshake failed; run `groundsearch mcp-stdio` directly and read stderr.",
        );
    }

    let report = DoctorReport {
        ok: api_key_env.is_some() && (!stdio.checked || stdio.ok),
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        api_key_env,
        baseline_model: groundsearch_core::BASELINE_MODEL,
        supported_models: groundsearch_core::SUPPORTED_MODELS,
        base_url_overridden: has_env("GROUNDSEARCH_OPENAI_BASE_URL")
            || has_env("OPENAI_BASE_URL"),
        env_file_set: has_env("GROUNDSEARCH_ENV_FILE"),
        timeout_ms: args.client.timeout_ms(),
        max_retries: args.client.max_retries(),
        stdio,
        hints,
    };

    if args.output.trim().eq_ignore_ascii_case("text") {
        println!("ok: {}", report.ok);
        println!("version: {} {}", report.name, report.version);
        println!("api_key_env: {}", report.api_key_env.unwrap_or("(missing)"));
        println!("base_url_overridden: {}", report.base_url_overridden);
        println!("timeout_ms: {}", report.timeout_ms);
        println!("max_retries: {}", report.max_retries);
        if report.stdio.checked {
            println!("stdio_ok: {}", report.stdio.ok);
            if let Some(e) = &report.stdio.error {
                println!("stdio_error: {e}");
            }
        }
        for h in &report.hints {
            println!("hint: {h}");
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
