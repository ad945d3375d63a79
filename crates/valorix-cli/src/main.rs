//! Command-line interface for valorix

mod settings;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use valorix_agents::register_builtin;
use valorix_registry::AgentRegistry;
use valorix_runtime::{ExecutionEngine, LogSink, Orchestrator};
use valorix_workflow::WorkflowTemplate;

use crate::settings::{CliConfig, build_request};

#[derive(Parser, Debug)]
#[command(name = "valorix")]
#[command(about = "Run a multi-agent company evaluation", long_about = None)]
struct Args {
    /// Company to evaluate
    #[arg(short, long)]
    company: String,

    /// Evaluation type, selects the workflow template
    #[arg(short = 't', long, default_value = "full")]
    evaluation_type: String,

    /// JSON file with the company's financial statements
    #[arg(short, long)]
    financials: Option<PathBuf>,

    /// Extra request parameter as key=value (repeatable)
    #[arg(short, long = "param")]
    params: Vec<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run deadline in seconds, overrides the configured one
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print the per-node status view instead of the consolidated outcome
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = CliConfig::load(args.config.as_deref())?;
    config.app.json_logs |= args.json_logs;
    valorix_utils::init_tracing_with(&config.app)?;

    info!(
        "Starting {} ({}) for company {}",
        config.app.app_name, config.app.environment, args.company
    );

    let mut registry = AgentRegistry::new();
    register_builtin(&mut registry).context("failed to register built-in agents")?;

    let engine = ExecutionEngine::new(Arc::new(registry), config.engine.clone())
        .context("failed to build execution engine")?
        .with_sink(Arc::new(LogSink));
    let orchestrator = Orchestrator::new(engine, WorkflowTemplate::company_evaluation());

    let request = build_request(
        &args.company,
        &args.evaluation_type,
        args.financials.as_deref(),
        &args.params,
        args.deadline_secs,
    )?;

    let run_id = orchestrator
        .start(request)
        .await
        .context("failed to start evaluation")?;
    let run = orchestrator
        .wait(&run_id)
        .await
        .with_context(|| format!("failed to wait for run {run_id}"))?;

    info!("Run {} finished as {:?}", run_id, run.overall_state);

    let rendered = if args.status {
        serde_json::to_string_pretty(&run.status_view())?
    } else {
        serde_json::to_string_pretty(&run.outcome())?
    };
    println!("{rendered}");

    Ok(())
}
