//! Upload → submit → render state machine.
//!
//! The controller owns the view state, the in-flight flag and the in-memory copy of the
//! cached rendering. Every state change is published as a [`WorkflowEvent::Snapshot`]
//! when a notifier is attached.

use crate::client::AnalysisService;
use crate::model::{
    AnalysisOption, AnalysisRequest, FileHandle, FileSet, OptionSet, ViewState, WorkflowEvent,
    WorkflowSnapshot,
};
use crate::render;
use crate::storage::RenderingStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;

/// What a call to [`WorkflowController::analyze`] ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    Succeeded { persisted: bool },
    Failed(String),
    SkippedNoFiles,
    SkippedInFlight,
}

struct WorkflowState {
    files: FileSet,
    options: OptionSet,
    view: ViewState,
    rendering: Option<String>,
    last_completed_utc: Option<String>,
}

/// Clears the in-flight flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct WorkflowController<C, S> {
    client: C,
    store: S,
    cache_key: String,
    in_flight: AtomicBool,
    state: Mutex<WorkflowState>,
    notify: Option<UnboundedSender<WorkflowEvent>>,
}

impl<C: AnalysisService, S: RenderingStore> WorkflowController<C, S> {
    /// Build a controller, restoring the last cached rendering from `store`.
    pub fn new(client: C, store: S, cache_key: impl Into<String>) -> Self {
        let cache_key = cache_key.into();
        let rendering = match store.load(&cache_key) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "could not load cached rendering");
                None
            }
        };
        Self {
            client,
            store,
            cache_key,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(WorkflowState {
                files: FileSet::default(),
                options: OptionSet::default(),
                view: ViewState::Idle,
                rendering,
                last_completed_utc: None,
            }),
            notify: None,
        }
    }

    pub fn with_notifier(mut self, tx: UnboundedSender<WorkflowEvent>) -> Self {
        self.notify = Some(tx);
        self
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_of(&self, st: &WorkflowState) -> WorkflowSnapshot {
        WorkflowSnapshot {
            view: st.view.clone(),
            files: st.files.clone(),
            options: st.options.clone(),
            rendering: st.rendering.clone(),
            in_flight: self.in_flight.load(Ordering::Acquire),
            last_completed_utc: st.last_completed_utc.clone(),
        }
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshot_of(&self.lock())
    }

    #[cfg(test)]
    pub fn view(&self) -> ViewState {
        self.lock().view.clone()
    }

    #[cfg(test)]
    pub fn cached_rendering(&self) -> Option<String> {
        self.lock().rendering.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn publish(&self) {
        if let Some(tx) = &self.notify {
            let _ = tx.send(WorkflowEvent::Snapshot(Box::new(self.snapshot())));
        }
    }

    fn notice(&self, msg: impl Into<String>) {
        if let Some(tx) = &self.notify {
            let _ = tx.send(WorkflowEvent::Notice(msg.into()));
        }
    }

    /// Resting view for the current selection; an in-flight analysis keeps `Analyzing`.
    fn settle(&self, st: &mut WorkflowState) {
        if self.is_in_flight() {
            return;
        }
        st.view = if st.files.is_empty() {
            ViewState::Idle
        } else {
            ViewState::Selecting(st.files.clone())
        };
    }

    /// Replace the file selection. Affects only the next `analyze()`.
    pub fn select(&self, handles: Vec<FileHandle>) {
        {
            let mut st = self.lock();
            st.files.select(handles);
            self.settle(&mut st);
        }
        self.publish();
    }

    pub fn toggle(&self, option: AnalysisOption) {
        {
            let mut st = self.lock();
            st.options.toggle(option);
            self.settle(&mut st);
        }
        self.publish();
    }

    /// Submit the current selection. No-op when nothing is selected or a submission is
    /// already running; the request captures files and options as they are right now.
    pub async fn analyze(&self) -> AnalyzeOutcome {
        let request = {
            let mut st = self.lock();
            if st.files.is_empty() {
                tracing::debug!("analyze skipped: no files selected");
                drop(st);
                self.notice("Select a file first");
                return AnalyzeOutcome::SkippedNoFiles;
            }
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                tracing::debug!("analyze skipped: submission already in flight");
                drop(st);
                self.notice("Analysis already in progress");
                return AnalyzeOutcome::SkippedInFlight;
            }
            st.view = ViewState::Analyzing;
            AnalysisRequest {
                files: st.files.clone(),
                options: st.options.clone(),
            }
        };
        let guard = FlightGuard(&self.in_flight);
        self.publish();

        let file = request
            .primary_file()
            .map(|f| f.name().to_string())
            .unwrap_or_default();
        let options: Vec<&str> = request.options.iter().map(|o| o.as_str()).collect();
        tracing::info!(%file, ?options, "analysis started");

        let result = self.client.submit(request).await;

        let outcome = match result {
            Ok(response) => {
                let text = render::format_response(&response);
                let persisted = match self.store.save(&self.cache_key, &text) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %format!("{e:#}"), "could not persist rendering");
                        self.notice(format!("Could not save results: {e:#}"));
                        false
                    }
                };
                tracing::info!(records = response.data.len(), persisted, "analysis succeeded");
                let mut st = self.lock();
                st.rendering = Some(text);
                st.view = ViewState::Success(Box::new(response));
                st.last_completed_utc = Some(now_utc());
                AnalyzeOutcome::Succeeded { persisted }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(error = %message, "analysis failed");
                let mut st = self.lock();
                st.view = ViewState::Error(message.clone());
                st.last_completed_utc = Some(now_utc());
                AnalyzeOutcome::Failed(message)
            }
        };

        drop(guard);
        self.publish();
        outcome
    }
}

fn now_utc() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}
