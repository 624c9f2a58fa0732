use futures::future::BoxFuture;
use serde_json::Value;

use trellis_core::error::Result;
use trellis_tools::ToolHandle;

/// Variable scope for one script evaluation.
///
/// Each execution receives a fresh scope; evaluators must not carry state
/// between invocations.
#[derive(Debug, Clone)]
pub struct ScriptScope {
    /// The merged input mapping, bound as `data`.
    pub data: Value,
    /// Capability handle for tool calls, when the workflow carries one.
    /// This is the complete set of external capabilities the script can
    /// reach.
    pub tools: Option<ToolHandle>,
}

/// Evaluates dynamically supplied node source.
///
/// The engine never executes source text itself. The embedding service
/// injects an implementation via `Workflow::with_evaluator` and owns the
/// sandboxing policy; the scope argument is the entire set of bindings
/// the source may touch. The returned value becomes the node's output.
pub trait ScriptEvaluator: Send + Sync + 'static {
    fn eval<'a>(&'a self, source: &'a str, scope: ScriptScope) -> BoxFuture<'a, Result<Value>>;
}
