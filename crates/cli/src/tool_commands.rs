use std::{path::Path, sync::Arc};

use {
    anyhow::{Context, Result, anyhow, bail},
    mcpbox_config::{Severity, load_explicit_or_discovered, validate_config},
    mcpbox_mcp::{AgentTool, McpToolWrapper, RecordStore, ToolBackend},
    mcpbox_orchestrator::{MultiServerOrchestrator, SetupReport},
    serde_json::{Value, json},
    tracing::{info, warn},
};

use crate::config_commands::print_diagnostics;

/// Load, validate and build an orchestrator. Refuses configs with errors.
fn build(config_path: Option<&Path>) -> Result<MultiServerOrchestrator> {
    let (config, path) = load_explicit_or_discovered(config_path)?;
    info!(path = %path.display(), backends = config.backends.len(), "loaded config");

    let diagnostics = validate_config(&config);
    print_diagnostics(&diagnostics, false);
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        bail!("{} has errors; run `mcpbox validate`", path.display());
    }

    Ok(MultiServerOrchestrator::from_config(&config)?)
}

/// Run `work` on a set-up orchestrator and always tear down afterwards,
/// including when interrupted with Ctrl-C.
async fn with_orchestrator<F>(config_path: Option<&Path>, work: F) -> Result<()>
where
    F: AsyncFnOnce(&MultiServerOrchestrator) -> Result<()>,
{
    let mut orch = build(config_path)?;

    let outcome = tokio::select! {
        result = async {
            let report = orch.setup().await?;
            print_failures(report);
            work(&orch).await
        } => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, tearing down");
            Err(anyhow!("interrupted"))
        },
    };

    orch.teardown().await;
    outcome
}

fn print_failures(report: &SetupReport) {
    for failed in report.failures() {
        if let Ok(line) = serde_json::to_string(failed) {
            eprintln!("backend failed: {line}");
        }
    }
}

/// `mcpbox tools`: descriptors and setup report as one JSON document.
pub async fn list(config_path: Option<&Path>) -> Result<()> {
    with_orchestrator(config_path, async |orch| {
        let out = json!({
            "tools": orch.descriptors(),
            "report": orch.report(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        Ok(())
    })
    .await
}

/// `mcpbox call <tool>`: print the tool's text result.
pub async fn call(config_path: Option<&Path>, tool: &str, args: Option<&str>) -> Result<()> {
    let arguments = parse_args(args)?;
    with_orchestrator(config_path, async move |orch| {
        let text = orch.call_tool(tool, arguments).await?;
        println!("{text}");
        Ok(())
    })
    .await
}

fn parse_args(args: Option<&str>) -> Result<Value> {
    match args {
        None => Ok(json!({})),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
            if !value.is_object() {
                bail!("--args must be a JSON object");
            }
            Ok(value)
        },
    }
}

/// `mcpbox demo`: the synthetic record store, no sandbox involved.
pub async fn demo() -> Result<()> {
    let backend: Arc<dyn ToolBackend> = Arc::new(RecordStore::sample().into_backend("records"));
    let tools = backend.connect().await?;
    let wrappers = McpToolWrapper::from_backend(&backend, &tools.into_values().collect::<Vec<_>>());

    let descriptors: Vec<Value> = wrappers.iter().map(|w| w.descriptor()).collect();
    println!("{}", serde_json::to_string_pretty(&descriptors)?);

    let search = wrappers
        .iter()
        .find(|w| w.name() == "search_records")
        .context("record store has no search tool")?;
    let result = search
        .execute(json!({"table_name": "Candidates", "query": "engineer"}))
        .await?;
    println!("\nsearch_records(query = \"engineer\"):\n{result}");

    backend.disconnect().await;
    Ok(())
}
