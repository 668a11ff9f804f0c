use serde::{Deserialize, Serialize};

/// Structured data extracted from one safety-alert PDF.
///
/// Mirrors the `incidents` table columns. Every field is optional: the model
/// returns an explicit null for anything the document does not state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub mine: Option<String>,
    pub owner: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub mineral: Option<String>,
    pub place: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub casualties: Option<i64>,
    pub injured: Option<i64>,
    pub cause: Option<String>,
    pub best_practices: Option<String>,
    pub cause_label: Option<String>,
}

impl Incident {
    /// Label for log lines, preferring the mine name.
    pub fn label(&self) -> &str {
        self.mine.as_deref().unwrap_or("unknown mine")
    }
}
