use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declared type of a workflow node.
///
/// The wire tags `python` and `if` are kept for compatibility with the
/// node-creation interface; in code the variants are named for what the
/// node does and continuation logic pattern-matches on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    End,
    Process,
    #[serde(rename = "python")]
    Script,
    #[serde(rename = "if")]
    Condition,
    Generic,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Process => "process",
            Self::Script => "python",
            Self::Condition => "if",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution status of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One entry of the per-run execution log, in visitation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub node: String,
    pub kind: NodeKind,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Target node taken by a conditional branch, when one was decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub elapsed_ms: u64,
}

/// Externally visible state of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub kind: NodeKind,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metadata about the most recent run, embedded in workflow snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Result envelope returned from a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub workflow: String,
    pub run_id: String,
    pub status: RunStatus,
    /// Final blackboard contents (a snapshot, not the live context).
    pub context: Map<String, Value>,
    pub execution_log: Vec<LogEntry>,
    pub nodes: HashMap<String, NodeSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// A directed edge, for structural snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub source: String,
    pub target: String,
}

/// Structural snapshot of a workflow. Never includes live context contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub name: String,
    pub start_node: Option<String>,
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunMeta>,
}

/// Structured result of a tool-gateway call.
///
/// Tool failures are data, never raised errors: callers branch on
/// `success` without any exception handling of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_tools: Option<Vec<String>>,
}

impl ToolOutcome {
    pub fn success(tool: impl Into<String>, result: Value) -> Self {
        Self {
            success: true,
            tool: Some(tool.into()),
            result: Some(result),
            error: None,
            status_code: None,
            available_tools: None,
        }
    }

    pub fn failure(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            tool: Some(tool.into()),
            result: None,
            error: Some(error.into()),
            status_code: None,
            available_tools: None,
        }
    }

    /// Unknown tool name, with the registry's known names attached.
    pub fn not_found(tool: &str, available: Vec<String>) -> Self {
        let mut outcome = Self::failure(tool, format!("Tool '{}' not found", tool));
        outcome.available_tools = Some(available);
        outcome
    }

    /// Non-2xx HTTP response.
    pub fn http_status(tool: impl Into<String>, status: u16) -> Self {
        Self::failure(tool, format!("HTTP error: {}", status)).with_status(status)
    }

    /// Request exceeded the per-call timeout.
    pub fn timeout(tool: impl Into<String>) -> Self {
        Self::failure(tool, "Request timeout")
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Fold the outcome into a JSON value, e.g. for a node's output.
    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
