//! Command loop for interactive sessions.
//!
//! Applies UI commands to the shared [`WorkflowController`] and runs submissions as
//! background tasks so the loop keeps accepting commands while one is in flight.

use super::workflow::{AnalyzeOutcome, WorkflowController};
use crate::client::AnalysisService;
use crate::model::{AnalysisOption, FileHandle};
use crate::storage::RenderingStore;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Select(Vec<FileHandle>),
    Toggle(AnalysisOption),
    Analyze,
    Quit,
}

/// Drive the workflow until the UI quits or drops its command channel.
pub(crate) async fn run_controller<C, S>(
    workflow: Arc<WorkflowController<C, S>>,
    analyze_on_launch: bool,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()>
where
    C: AnalysisService + 'static,
    S: RenderingStore + 'static,
{
    let mut tasks: JoinSet<AnalyzeOutcome> = JoinSet::new();
    if analyze_on_launch {
        spawn_analysis(&mut tasks, &workflow);
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Select(files)) => workflow.select(files),
                    Some(UiCommand::Toggle(option)) => workflow.toggle(option),
                    // The workflow's own guard turns overlapping requests into no-ops.
                    Some(UiCommand::Analyze) => spawn_analysis(&mut tasks, &workflow),
                    Some(UiCommand::Quit) | None => break,
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                match joined {
                    Ok(outcome) => tracing::debug!(?outcome, "analysis task finished"),
                    Err(e) => tracing::error!(error = %e, "analysis task failed to join"),
                }
            }
        }
    }

    if !tasks.is_empty() {
        tracing::info!("quitting with an analysis still in flight");
    }
    Ok(())
}

fn spawn_analysis<C, S>(
    tasks: &mut JoinSet<AnalyzeOutcome>,
    workflow: &Arc<WorkflowController<C, S>>,
) where
    C: AnalysisService + 'static,
    S: RenderingStore + 'static,
{
    let workflow = Arc::clone(workflow);
    tasks.spawn(async move { workflow.analyze().await });
}
