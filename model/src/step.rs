use serde::{Deserialize, Serialize};

/// A single step in the sequence a client must execute to complete an
/// action (listing, approval, bulk cancel). No HTTP framework is attached
/// here; this is just the data shape a step-sequence builder would emit.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Step {
    pub action: String,
    pub description: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub data: Option<serde_json::Value>,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Transaction,
    Signature,
    Request,
    Confirmation,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Incomplete,
    Complete,
}
