use crate::model::{ViewState, WorkflowEvent, WorkflowSnapshot};
use std::path::PathBuf;

pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub endpoint: String,
    pub snapshot: WorkflowSnapshot,
    // Some while the user is typing a path list
    pub input: Option<String>,
    pub log_path: Option<PathBuf>,
}

impl UiState {
    pub fn new(snapshot: WorkflowSnapshot, endpoint: String) -> Self {
        Self {
            tab: 0,
            info: String::new(),
            endpoint,
            snapshot,
            input: None,
            log_path: None,
        }
    }

    pub fn apply_event(&mut self, ev: WorkflowEvent) {
        match ev {
            WorkflowEvent::Snapshot(next) => {
                let was = self.snapshot.view.label();
                match &next.view {
                    ViewState::Analyzing if was != "Analyzing" => {
                        self.info = "Analyzing…".into();
                    }
                    ViewState::Success(_) if was == "Analyzing" => {
                        self.info = "Analysis complete".into();
                    }
                    ViewState::Error(_) if was == "Analyzing" => {
                        self.info = "Analysis failed".into();
                    }
                    _ => {}
                }
                self.snapshot = *next;
            }
            WorkflowEvent::Notice(msg) => self.info = msg,
        }
    }

    pub fn has_files(&self) -> bool {
        !self.snapshot.files.is_empty()
    }
}

/// Split pasted or typed text into paths. Terminals paste dropped files as
/// whitespace-separated, sometimes quoted or `file://` paths.
pub fn parse_paths(text: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match (quote, c) {
            (None, '\\') => escaped = true,
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    paths.push(to_path(&current));
                    current.clear();
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        paths.push(to_path(&current));
    }
    paths
}

fn to_path(raw: &str) -> PathBuf {
    PathBuf::from(raw.strip_prefix("file://").unwrap_or(raw))
}
