/// Grading result for one image
///
/// The pipeline only ever looks at `is_worth_keeping`. Everything else the
/// grading service returns is carried along untouched so that writing it to
/// a sidecar and reading it back never loses a field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Keep/reject verdict
    pub is_worth_keeping: bool,

    /// Overall quality score, scale defined by the grading service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Free-text justification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Any other fields (per-criterion scores, tags, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Evaluation {
    pub fn new(is_worth_keeping: bool) -> Self {
        Self {
            is_worth_keeping,
            score: None,
            reasoning: None,
            extra: Map::new(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
