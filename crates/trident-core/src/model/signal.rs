use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Started,
    Completed,
    Failed,
    Ready,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalType::Started => "started",
            SignalType::Completed => "completed",
            SignalType::Failed => "failed",
            SignalType::Ready => "ready",
        };
        write!(f, "{s}")
    }
}

/// A declarative marker, persisted as one file per `(workflow, type)`,
/// indicating a workflow-wide state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub workflow: String,
    #[serde(default)]
    pub outputs_path: Option<String>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

impl Signal {
    pub fn new(
        signal_type: SignalType,
        run_id: Uuid,
        workflow: impl Into<String>,
        outputs_path: Option<String>,
        metadata: Option<JsonValue>,
    ) -> Self {
        Self {
            signal_type,
            run_id,
            timestamp: Utc::now(),
            workflow: workflow.into(),
            outputs_path,
            metadata,
        }
    }
}
