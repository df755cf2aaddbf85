use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use stride_config::WorkflowConfig;
use stride_engine::{EngineConfig, Isolation, WorkflowEngine};
use stride_supervisor::{run_step_host, SupervisorConfig};

mod actions;

/// Stride - a workflow execution engine
#[derive(Parser)]
#[command(name = "stride")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.stride)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Run each step in an isolated OS process
    #[arg(long)]
    isolate: bool,
  },

  /// Run one step under supervision (spawned by the engine, not for direct use)
  #[command(hide = true)]
  StepHost,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = cli.data_dir.unwrap_or_else(|| {
    dirs::home_dir()
      .expect("could not determine home directory")
      .join(".stride")
  });

  match cli.command {
    Some(Commands::Run {
      workflow_file,
      isolate,
    }) => {
      run_workflow(workflow_file, data_dir, isolate)?;
    }
    Some(Commands::StepHost) => {
      step_host()?;
    }
    None => {
      println!("stride - use --help to see available commands");
    }
  }

  Ok(())
}

fn run_workflow(workflow_file: PathBuf, data_dir: PathBuf, isolate: bool) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_workflow_async(workflow_file, data_dir, isolate).await })
}

async fn run_workflow_async(workflow_file: PathBuf, data_dir: PathBuf, isolate: bool) -> Result<()> {
  // Read workflow definition
  let workflow_content = tokio::fs::read_to_string(&workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let workflow: WorkflowConfig = serde_json::from_str(&workflow_content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  eprintln!("Loaded workflow: {} v{}", workflow.name, workflow.version);

  // Read input from stdin
  let input = read_input_from_stdin()?;

  let isolation = if isolate {
    let program = std::env::current_exe().context("could not determine current executable")?;
    Isolation::Isolated(SupervisorConfig {
      program,
      args: vec!["step-host".to_string()],
      memory_limit_mb: workflow.options.memory_limit_mb,
    })
  } else {
    Isolation::InProcess
  };

  let config = EngineConfig {
    output_dir: data_dir.join("runs"),
    isolation,
  };
  let engine = WorkflowEngine::new(Arc::new(actions::builtin()), config);

  // Execute workflow
  let cancel = CancellationToken::new();
  let result = engine
    .execute(workflow, input, cancel)
    .await
    .context("workflow execution failed")?;

  eprintln!("Run completed: {}", result.run_id);
  eprintln!(
    "Steps: {} ({})",
    result.steps.len(),
    if result.failed { "failed" } else { "ok" }
  );

  println!("{}", serde_json::to_string_pretty(&result.output)?);

  Ok(())
}

/// Child entry point for isolated steps: speak the step-host protocol on
/// stdio against the built-in action modules.
fn step_host() -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  let host = actions::builtin();
  rt.block_on(async { run_step_host(&host).await })
    .context("step host failed")?;
  Ok(())
}

fn read_input_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read input from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse input JSON from stdin")
    }
  }
}
