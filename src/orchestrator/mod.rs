//! Application-level orchestration.
//!
//! `workflow` owns the upload → submit → render state machine; `controller` drives it
//! from UI commands for the terminal front end.

#[cfg(feature = "tui")]
mod controller;
mod workflow;

#[cfg(feature = "tui")]
pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use workflow::{AnalyzeOutcome, WorkflowController};
