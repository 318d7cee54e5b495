use anyhow::{Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub data_dir: PathBuf,
    pub cache_key: String,
}

/// A user-supplied file captured at selection time.
#[derive(Clone, PartialEq, Eq)]
pub struct FileHandle {
    name: String,
    contents: Bytes,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    /// Read a file from disk; the display name is the final path component.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, contents))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &Bytes {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("len", &self.contents.len())
            .finish()
    }
}

/// Current file selection, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<FileHandle>,
}

impl FileSet {
    /// Replace the selection wholesale. An empty list clears it.
    pub fn select(&mut self, handles: Vec<FileHandle>) {
        self.files = handles;
    }

    pub fn first(&self) -> Option<&FileHandle> {
        self.files.first()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileHandle> {
        self.files.iter()
    }
}

/// The fixed catalog of analysis options the service understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum AnalysisOption {
    #[serde(rename = "ERC20")]
    #[value(name = "ERC20")]
    Erc20,
    #[serde(rename = "ERC721")]
    #[value(name = "ERC721")]
    Erc721,
    #[serde(rename = "ERC1155")]
    #[value(name = "ERC1155")]
    Erc1155,
}

impl AnalysisOption {
    pub const ALL: [AnalysisOption; 3] = [
        AnalysisOption::Erc20,
        AnalysisOption::Erc721,
        AnalysisOption::Erc1155,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisOption::Erc20 => "ERC20",
            AnalysisOption::Erc721 => "ERC721",
            AnalysisOption::Erc1155 => "ERC1155",
        }
    }
}

impl fmt::Display for AnalysisOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisOption {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|o| o.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown analysis option: {s}"))
    }
}

/// Chosen options. Membership is toggled, so there are never duplicates;
/// iteration follows the order options were switched on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OptionSet {
    options: Vec<AnalysisOption>,
}

impl OptionSet {
    pub fn toggle(&mut self, option: AnalysisOption) {
        if let Some(pos) = self.options.iter().position(|o| *o == option) {
            self.options.remove(pos);
        } else {
            self.options.push(option);
        }
    }

    pub fn contains(&self, option: AnalysisOption) -> bool {
        self.options.contains(&option)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AnalysisOption> + '_ {
        self.options.iter().copied()
    }

    /// JSON array of option tokens, e.g. `["ERC721"]`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Files and options captured at the moment `analyze()` was invoked.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub files: FileSet,
    pub options: OptionSet,
}

impl AnalysisRequest {
    /// Only the first selected file is transmitted.
    pub fn primary_file(&self) -> Option<&FileHandle> {
        self.files.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    pub data: RecordMap,
}

/// Per-contract analysis keyed by file name, in the order the service sent them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMap(Vec<(String, AnalysisRecord)>);

impl RecordMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnalysisRecord)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, AnalysisRecord)> for RecordMap {
    fn from_iter<I: IntoIterator<Item = (String, AnalysisRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for RecordMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // serde_json's preserve_order keeps the wire order of keys here.
        serde_json::Map::<String, Value>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_value::<AnalysisRecord>(value)
                    .map(|record| (key, record))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

impl Serialize for RecordMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

/// One analysed contract. Inner shapes are kept as raw JSON; rendering decides how to show
/// values that are not the usual object / list of names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(default)]
    pub compliance: Value,
    #[serde(default, deserialize_with = "modules_or_note")]
    pub oz_modules: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The service sends a bare string instead of a list when it cannot parse imports.
/// Any other non-list value is kept as a single item.
fn modules_or_note<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

/// What the presentation layer should show.
///
/// `Success` and `Error` are resting states: they stay until the next `select`/`toggle`
/// moves the view back to `Selecting` (or `Idle`), and `analyze()` is accepted from both.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Idle,
    Selecting(FileSet),
    Analyzing,
    // Boxed so the idle variants stay small.
    Success(Box<AnalysisResponse>),
    Error(String),
}

impl ViewState {
    pub fn label(&self) -> &'static str {
        match self {
            ViewState::Idle => "Idle",
            ViewState::Selecting(_) => "Selecting",
            ViewState::Analyzing => "Analyzing",
            ViewState::Success(_) => "Success",
            ViewState::Error(_) => "Error",
        }
    }
}

/// Read-only copy of workflow state handed to presentation layers.
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub view: ViewState,
    pub files: FileSet,
    pub options: OptionSet,
    pub rendering: Option<String>,
    pub in_flight: bool,
    pub last_completed_utc: Option<String>,
}

/// Events emitted by the workflow for presentation layers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    // Boxed to keep the channel payload small.
    Snapshot(Box<WorkflowSnapshot>),
    Notice(String),
}
