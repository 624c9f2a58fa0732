use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    // Graph structure errors
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Workflow already exists: {0}")]
    WorkflowExists(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Workflow '{0}' has no start node")]
    MissingStartNode(String),

    #[error("Workflow has a cycle")]
    CyclicGraph,

    // Node execution errors
    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("No script evaluator configured for node: {0}")]
    EvaluatorMissing(String),

    #[error("Condition evaluation failed: {0}")]
    Condition(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool call failed: {tool}: {message}")]
    ToolCall { tool: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
