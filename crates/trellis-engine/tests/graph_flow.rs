use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::{NodeKind, NodeStatus, RunStatus};
use trellis_engine::{Node, ScriptEvaluator, ScriptScope, Workflow};
use trellis_tools::{ToolGateway, ToolHandle};

/// Test evaluator with a fixed dialect: `double value` doubles a numeric
/// field, `call <tool>` invokes a tool with the data as params and folds
/// the outcome into the output, anything else is an evaluation error.
struct FixtureEvaluator;

impl ScriptEvaluator for FixtureEvaluator {
    fn eval<'a>(&'a self, source: &'a str, scope: ScriptScope) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if let Some(field) = source.strip_prefix("double ") {
                let current = scope.data.get(field).and_then(Value::as_i64).unwrap_or(0);
                let mut out = Map::new();
                out.insert(field.to_string(), json!(current * 2));
                return Ok(Value::Object(out));
            }
            if let Some(tool) = source.strip_prefix("call ") {
                let Some(handle) = &scope.tools else {
                    return Err(TrellisError::Script("no tools in scope".into()));
                };
                let params = scope.data.as_object().cloned().unwrap_or_default();
                let outcome = handle.call(tool, params).await;
                return Ok(json!({ "tool_outcome": outcome.into_value() }));
            }
            Err(TrellisError::Script(format!("unknown source: {}", source)))
        })
    }
}

fn obj(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn gateway_with_add() -> Arc<ToolGateway> {
    let gateway = ToolGateway::new();
    gateway.register_function("add", "Add two numbers", |params| async move {
        let a = params.get("a").and_then(Value::as_i64).ok_or_else(|| TrellisError::ToolCall {
            tool: "add".into(),
            message: "missing parameter: a".into(),
        })?;
        let b = params.get("b").and_then(Value::as_i64).ok_or_else(|| TrellisError::ToolCall {
            tool: "add".into(),
            message: "missing parameter: b".into(),
        })?;
        Ok(json!({"result": a + b}))
    });
    Arc::new(gateway)
}

#[tokio::test]
async fn scripted_node_doubles_through_evaluator() {
    let mut wf = Workflow::new("double").with_evaluator(Arc::new(FixtureEvaluator));
    wf.add_node(Node::passthrough("S", NodeKind::Start));
    wf.add_script("D", "double value");
    wf.connect("S", "D").unwrap();

    let report = wf.run(obj(json!({"value": 21}))).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.context["value"], json!(42));
    assert_eq!(report.execution_log.len(), 2);
    assert_eq!(report.execution_log[0].node, "S");
    assert_eq!(report.execution_log[1].node, "D");
    assert!(report
        .execution_log
        .iter()
        .all(|e| e.status == NodeStatus::Completed));
}

#[tokio::test]
async fn scripted_node_reaches_tools_through_scope() {
    let gateway = gateway_with_add();
    let mut wf = Workflow::new("summing")
        .with_evaluator(Arc::new(FixtureEvaluator))
        .with_tools(ToolHandle::new(gateway.clone()));
    wf.add_node(Node::passthrough("S", NodeKind::Start));
    wf.add_script("adder", "call add");
    wf.connect("S", "adder").unwrap();

    let report = wf.run(obj(json!({"a": 2, "b": 3}))).await;

    assert_eq!(report.status, RunStatus::Completed);
    let outcome = &report.context["tool_outcome"];
    assert_eq!(outcome["success"], json!(true));
    assert_eq!(outcome["result"], json!({"result": 5}));
    assert_eq!(gateway.stats().total_calls, 1);
}

#[tokio::test]
async fn tool_failure_stays_data_and_run_completes() {
    let gateway = gateway_with_add();
    let mut wf = Workflow::new("partial")
        .with_evaluator(Arc::new(FixtureEvaluator))
        .with_tools(ToolHandle::new(gateway));
    wf.add_node(Node::passthrough("S", NodeKind::Start));
    wf.add_script("adder", "call add");
    wf.connect("S", "adder").unwrap();

    // Missing parameter: the tool call fails but the run does not.
    let report = wf.run(obj(json!({"a": 2}))).await;

    assert_eq!(report.status, RunStatus::Completed);
    let outcome = &report.context["tool_outcome"];
    assert_eq!(outcome["success"], json!(false));
    assert!(outcome["error"]
        .as_str()
        .unwrap()
        .contains("missing parameter: b"));
}

#[tokio::test]
async fn allow_list_restricts_script_capabilities() {
    let gateway = gateway_with_add();
    let mut wf = Workflow::new("restricted")
        .with_evaluator(Arc::new(FixtureEvaluator))
        .with_tools(ToolHandle::with_allowed(gateway.clone(), vec!["other".into()]));
    wf.add_script("adder", "call add");

    let report = wf.run(obj(json!({"a": 2, "b": 3}))).await;

    assert_eq!(report.status, RunStatus::Completed);
    let outcome = &report.context["tool_outcome"];
    assert_eq!(outcome["success"], json!(false));
    assert!(outcome["error"].as_str().unwrap().contains("not allowed"));
    assert_eq!(gateway.stats().total_calls, 0);
}

#[tokio::test]
async fn script_evaluation_error_aborts_run() {
    let mut wf = Workflow::new("broken").with_evaluator(Arc::new(FixtureEvaluator));
    wf.add_node(Node::passthrough("S", NodeKind::Start));
    wf.add_script("bad", "garbage");
    wf.add_node(Node::passthrough("after", NodeKind::Process));
    wf.connect("S", "bad").unwrap();
    wf.connect("bad", "after").unwrap();

    let report = wf.run(Map::new()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.as_deref().unwrap().contains("unknown source"));
    assert_eq!(report.execution_log.len(), 2);
    assert_eq!(report.execution_log[1].status, NodeStatus::Failed);
    assert_eq!(report.nodes["after"].status, NodeStatus::Pending);
}

#[tokio::test]
async fn conditional_routes_into_scripted_branches() {
    let gateway = gateway_with_add();
    let mut wf = Workflow::new("graded")
        .with_evaluator(Arc::new(FixtureEvaluator))
        .with_tools(ToolHandle::new(gateway));
    wf.add_node(Node::passthrough("start", NodeKind::Start));
    wf.add_condition("gate", "value >= 10");
    wf.add_script("big", "double value");
    wf.add_node(Node::terminal("small"));
    wf.connect("start", "gate").unwrap();
    wf.connect("gate", "big").unwrap();
    wf.connect("gate", "small").unwrap();

    let report = wf.run(obj(json!({"value": 12}))).await;
    assert_eq!(report.context["value"], json!(24));
    assert_eq!(
        report.execution_log[1].branch.as_deref(),
        Some("big")
    );

    let mut wf2 = Workflow::new("graded2").with_evaluator(Arc::new(FixtureEvaluator));
    wf2.add_node(Node::passthrough("start", NodeKind::Start));
    wf2.add_condition("gate", "value >= 10");
    wf2.add_script("big", "double value");
    wf2.add_node(Node::terminal("small"));
    wf2.connect("start", "gate").unwrap();
    wf2.connect("gate", "big").unwrap();
    wf2.connect("gate", "small").unwrap();

    let report = wf2.run(obj(json!({"value": 3}))).await;
    assert_eq!(report.context["value"], json!(3));
    assert!(report.context.get("final_output").is_some());
    assert_eq!(report.nodes["big"].status, NodeStatus::Pending);
}
