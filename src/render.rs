//! Rendering of a successful analysis response.
//!
//! [`build_rendering`] is the pure transformation from response data to a structured
//! document; [`Rendering::to_text`] serializes it. The text is what gets cached and
//! compared across sessions, so both steps must stay deterministic.

use crate::model::{AnalysisRecord, AnalysisResponse};
use serde_json::Value;

/// Compliance key surfaced in every block.
pub const COMPLIANCE_KEY: &str = "ERC721";
/// Marker for a compliance value the service did not send.
pub const MISSING_MARKER: &str = "undefined";

/// One titled block per analysed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBlock {
    pub title: String,
    pub error: Option<String>,
    pub compliance: String,
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendering {
    pub blocks: Vec<RenderedBlock>,
}

/// Build the rendering tree, one block per record in the order the service sent them.
pub fn build_rendering(response: &AnalysisResponse) -> Rendering {
    Rendering {
        blocks: response
            .data
            .iter()
            .map(|(title, record)| build_block(title, record))
            .collect(),
    }
}

fn build_block(title: &str, record: &AnalysisRecord) -> RenderedBlock {
    RenderedBlock {
        title: title.to_string(),
        error: record.error.clone(),
        // A non-object compliance value has no key to look up.
        compliance: record
            .compliance
            .as_object()
            .and_then(|c| c.get(COMPLIANCE_KEY))
            .map(scalar_text)
            .unwrap_or_else(|| MISSING_MARKER.to_string()),
        modules: record.oz_modules.iter().map(scalar_text).collect(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RenderedBlock {
    fn write_text(&self, out: &mut String) {
        out.push_str(&self.title);
        out.push('\n');
        if let Some(err) = self.error.as_deref() {
            out.push_str(&format!("  Error: {err}\n"));
        }
        out.push_str("  Compliance:\n");
        out.push_str(&format!("    {COMPLIANCE_KEY}: {}\n", self.compliance));
        out.push_str("  oz_modules:\n");
        for (i, module) in self.modules.iter().enumerate() {
            out.push_str(&format!("    {}. {module}\n", i + 1));
        }
    }
}

impl Rendering {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Serialize to the cached text form. Blocks are separated by a blank line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            block.write_text(&mut out);
        }
        out
    }
}

/// Format a response straight to its cached text.
pub fn format_response(response: &AnalysisResponse) -> String {
    build_rendering(response).to_text()
}

/// `Progress: N%` label; whole numbers print without a decimal point.
pub fn progress_label(progress: f64) -> String {
    if progress.fract() == 0.0 {
        format!("Progress: {progress:.0}%")
    } else {
        format!("Progress: {progress:.1}%")
    }
}
