use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::{NodeKind, NodeSnapshot, NodeStatus};
use trellis_tools::ToolHandle;

use crate::condition;
use crate::context::Context;
use crate::script::{ScriptEvaluator, ScriptScope};

/// Body that receives the merged input mapping.
pub type NodeFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Zero-parameter body, invoked with nothing.
pub type ThunkFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Executable body of a node.
#[derive(Clone)]
pub enum Body {
    Fn(NodeFn),
    Thunk(ThunkFn),
    /// Dynamically supplied source, deferred to the workflow's evaluator.
    Script { source: String },
}

/// Capabilities the engine lends a node for one execution.
#[derive(Default, Clone, Copy)]
pub struct ExecEnv<'a> {
    pub evaluator: Option<&'a Arc<dyn ScriptEvaluator>>,
    pub tools: Option<&'a ToolHandle>,
}

/// A unit of computation in a workflow.
///
/// Tracks its own status, last input/output snapshots, and last error.
/// Nodes live and die with their workflow; execution mutates only the
/// node itself and the run's context.
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    body: Body,
    pub status: NodeStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl Node {
    pub fn new<F, Fut>(name: impl Into<String>, kind: NodeKind, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::with_body(name, kind, Body::Fn(Arc::new(move |input| Box::pin(f(input)))))
    }

    /// A node whose body takes no parameters.
    pub fn from_thunk<F, Fut>(name: impl Into<String>, kind: NodeKind, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::with_body(name, kind, Body::Thunk(Arc::new(move || Box::pin(f()))))
    }

    /// Identity body: returns its input unchanged.
    pub fn passthrough(name: impl Into<String>, kind: NodeKind) -> Self {
        Self::new(name, kind, |data| async move { Ok(data) })
    }

    /// End node: wraps the accumulated data as the final output.
    pub fn terminal(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::End, |data| async move {
            Ok(json!({ "final_output": data }))
        })
    }

    /// Format-string node: substitutes `{key}` placeholders from the data.
    /// A missing key produces an error field instead of failing the run.
    pub fn template(name: impl Into<String>, template: impl Into<String>) -> Self {
        let template = template.into();
        Self::new(name, NodeKind::Process, move |data| {
            let result = match render_template(&template, &data) {
                Ok(text) => json!({ "text": text }),
                Err(key) => json!({ "error": format!("Missing key: {}", key) }),
            };
            async move { Ok(result) }
        })
    }

    /// Conditional node: evaluates a boolean expression against the data
    /// and exposes the result as `condition_met`. Evaluation errors come
    /// back as `condition_met: false` with an error field, never a raise.
    pub fn condition(name: impl Into<String>, expr: impl Into<String>) -> Self {
        let expr = expr.into();
        Self::new(name, NodeKind::Condition, move |data| {
            let result = match condition::evaluate(&expr, &data) {
                Ok(met) => json!({ "condition_met": met }),
                Err(e) => json!({ "condition_met": false, "error": e.to_string() }),
            };
            async move { Ok(result) }
        })
    }

    /// Scripted node: source text evaluated by the workflow's injected
    /// evaluator, with the merged data and a tool handle in scope.
    pub fn script(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::with_body(name, NodeKind::Script, Body::Script {
            source: source.into(),
        })
    }

    fn with_body(name: impl Into<String>, kind: NodeKind, body: Body) -> Self {
        Self {
            name: name.into(),
            kind,
            body,
            status: NodeStatus::Pending,
            input: None,
            output: None,
            error: None,
        }
    }

    /// Execute the body against the context.
    ///
    /// The call input is a context snapshot overlaid with the explicit
    /// input (explicit keys win). A mapping result merges into the context
    /// directly; anything else is wrapped as `{"result": value}` first.
    /// On failure the error is captured here and propagated to the engine.
    ///
    /// Re-executing a node re-enters `running` and overwrites prior
    /// status and output; successive invocations share this one instance.
    pub async fn execute(
        &mut self,
        context: &mut Context,
        explicit_input: Map<String, Value>,
        env: ExecEnv<'_>,
    ) -> Result<Value> {
        self.status = NodeStatus::Running;

        let mut input = context.snapshot();
        input.extend(explicit_input);
        self.input = Some(Value::Object(input.clone()));

        let result = match &self.body {
            Body::Fn(f) => f(Value::Object(input)).await,
            Body::Thunk(f) => f().await,
            Body::Script { source } => match env.evaluator {
                Some(evaluator) => {
                    let scope = ScriptScope {
                        data: Value::Object(input),
                        tools: env.tools.cloned(),
                    };
                    evaluator.eval(source, scope).await
                }
                None => Err(TrellisError::EvaluatorMissing(self.name.clone())),
            },
        };

        match result {
            Ok(value) => {
                let output = wrap_output(&value);
                context.update(output.clone());
                self.output = Some(Value::Object(output));
                self.error = None;
                self.status = NodeStatus::Completed;
                Ok(value)
            }
            Err(e) => {
                self.status = NodeStatus::Failed;
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            name: self.name.clone(),
            kind: self.kind,
            status: self.status,
            input: self.input.clone(),
            output: self.output.clone(),
            error: self.error.clone(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("error", &self.error)
            .finish()
    }
}

/// Mapping results merge as-is; anything else lands under `result`.
pub(crate) fn wrap_output(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("result".into(), other.clone());
            map
        }
    }
}

fn render_template(template: &str, data: &Value) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let key = &rest[open + 1..open + close];
        match data.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => return Err(key.to_string()),
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
