use crate::client::HttpAnalysisClient;
use crate::model::{AnalysisOption, AnalysisResponse, FileHandle, ViewState, WorkflowConfig};
use crate::orchestrator::{AnalyzeOutcome, WorkflowController};
use crate::storage::{FileStore, RenderingStore};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Key under which the last rendering is persisted.
pub const CACHE_KEY: &str = "formattedData";

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "papers-please",
    version,
    about = "Submit smart-contract archives for EIP compliance analysis"
)]
pub struct Cli {
    /// Files to analyze (only the first one is uploaded)
    pub files: Vec<PathBuf>,

    /// Analysis service endpoint
    #[arg(long, default_value = "http://127.0.0.1:5000/analyze")]
    pub endpoint: String,

    /// EIP to check; repeat for several (naming one twice toggles it back off)
    #[arg(long = "option", value_enum)]
    pub options: Vec<AnalysisOption>,

    /// Analyze once and print the rendering (no TUI)
    #[arg(long, conflicts_with = "json")]
    pub text: bool,

    /// Analyze once and print the raw response as JSON (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print the last cached rendering and exit
    #[arg(long, conflicts_with_all = ["text", "json"])]
    pub show_cached: bool,

    /// Also write the raw response to this file
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Also write the rendering to this file
    #[arg(long)]
    pub export_text: Option<PathBuf>,

    /// Directory for the cached rendering and logs
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Start an analysis as soon as the TUI opens (requires files)
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub analyze_on_launch: bool,
}

impl Cli {
    pub fn is_headless(&self) -> bool {
        self.text || self.json || self.show_cached
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.show_cached {
        return show_cached(&args);
    }

    if !args.is_headless() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            crate::logging::init_stderr();
            return run_headless(args).await;
        }
    }

    crate::logging::init_stderr();
    run_headless(args).await
}

/// Build a `WorkflowConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> WorkflowConfig {
    WorkflowConfig {
        endpoint: args.endpoint.clone(),
        user_agent: format!("papers-please/{}", env!("CARGO_PKG_VERSION")),
        data_dir: args
            .data_dir
            .clone()
            .unwrap_or_else(crate::storage::default_data_dir),
        cache_key: CACHE_KEY.to_string(),
    }
}

/// Read every path into a file handle, in the order given.
pub fn load_files(paths: &[PathBuf]) -> Result<Vec<FileHandle>> {
    paths.iter().map(|p| FileHandle::from_path(p)).collect()
}

/// Build the workflow and apply the initial selection from the command line.
pub fn build_workflow(
    args: &Cli,
    cfg: &WorkflowConfig,
) -> Result<WorkflowController<HttpAnalysisClient, FileStore>> {
    let client = HttpAnalysisClient::new(cfg)?;
    let store = FileStore::new(cfg.data_dir.clone());
    let workflow = WorkflowController::new(client, store, cfg.cache_key.clone());
    apply_selection(args, &workflow)?;
    Ok(workflow)
}

fn apply_selection(
    args: &Cli,
    workflow: &WorkflowController<HttpAnalysisClient, FileStore>,
) -> Result<()> {
    if !args.files.is_empty() {
        workflow.select(load_files(&args.files)?);
    }
    for option in &args.options {
        workflow.toggle(*option);
    }
    Ok(())
}

fn show_cached(args: &Cli) -> Result<()> {
    let cfg = build_config(args);
    let store = FileStore::new(cfg.data_dir.clone());
    match store
        .load(&cfg.cache_key)
        .context("failed to read cached rendering")?
    {
        Some(text) => {
            let mut out = std::io::stdout().lock();
            out.write_all(text.as_bytes())?;
            out.flush()?;
        }
        None => eprintln!("No cached analysis results in {}", store.dir().display()),
    }
    Ok(())
}

/// Analyze once, print the result, and apply exports.
async fn run_headless(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let workflow = build_workflow(&args, &cfg)?;
    let outcome = tokio::select! {
        outcome = workflow.analyze() => outcome,
        _ = tokio::signal::ctrl_c() => return Err(anyhow::anyhow!("interrupted")),
    };
    let persisted = match outcome {
        AnalyzeOutcome::Succeeded { persisted } => persisted,
        AnalyzeOutcome::Failed(msg) => return Err(anyhow::anyhow!("analysis failed: {msg}")),
        AnalyzeOutcome::SkippedNoFiles => {
            return Err(anyhow::anyhow!(
                "no files selected; pass at least one file to analyze"
            ))
        }
        AnalyzeOutcome::SkippedInFlight => {
            return Err(anyhow::anyhow!("an analysis is already in progress"))
        }
    };

    let snapshot = workflow.snapshot();
    let ViewState::Success(response) = &snapshot.view else {
        return Err(anyhow::anyhow!(
            "unexpected workflow state after success: {}",
            snapshot.view.label()
        ));
    };
    let rendering = snapshot.rendering.clone().unwrap_or_default();

    handle_exports(&args, response, &rendering)?;

    let (out_tx, out_handle) = spawn_output_writer();

    if args.json {
        let out = serde_json::to_string_pretty(response.as_ref())?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        if let Some(msg) = response.message.as_deref() {
            let _ = out_tx.send(OutputLine::Stderr(format!("Message: {msg}")));
        }
        if let Some(progress) = response.progress {
            let _ = out_tx.send(OutputLine::Stderr(crate::render::progress_label(progress)));
        }
        for line in rendering.lines() {
            let _ = out_tx.send(OutputLine::Stdout(line.to_string()));
        }
    }

    let saved_msg = if persisted {
        format!("Saved: {}", cfg.data_dir.join(&cfg.cache_key).display())
    } else {
        "Warning: results could not be saved; see log output".to_string()
    };
    let _ = out_tx.send(OutputLine::Stderr(saved_msg));

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Handle export operations (JSON and text) for headless modes.
fn handle_exports(args: &Cli, response: &AnalysisResponse, rendering: &str) -> Result<()> {
    if let Some(p) = args.export_json.as_deref() {
        crate::storage::export_json(p, response)?;
    }
    if let Some(p) = args.export_text.as_deref() {
        crate::storage::export_text(p, rendering)?;
    }
    Ok(())
}
