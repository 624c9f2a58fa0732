use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::{
    EdgeSnapshot, LogEntry, NodeKind, NodeSnapshot, NodeStatus, RunMeta, RunReport, RunStatus,
    WorkflowSnapshot,
};
use trellis_tools::ToolHandle;

use crate::context::Context;
use crate::node::{ExecEnv, Node};
use crate::script::ScriptEvaluator;

/// A named directed graph of nodes, executable end-to-end.
///
/// Traversal is a demand-driven breadth-first walk, not a precomputed
/// topological order: conditional nodes decide their successors only
/// after executing, so the reachable subgraph depends on the input. Each
/// node executes at most once per run, which also keeps structurally
/// cyclic graphs from hanging the engine — a node reached again over a
/// loop-back edge is skipped, not re-executed.
pub struct Workflow {
    name: String,
    nodes: HashMap<String, Node>,
    /// Node names in insertion order, for stable snapshots.
    order: Vec<String>,
    /// source → targets, insertion order preserved, de-duplicated.
    edges: HashMap<String, Vec<String>>,
    /// target → sources.
    reverse_edges: HashMap<String, Vec<String>>,
    start: Option<String>,
    status: RunStatus,
    last_error: Option<String>,
    last_run: Option<RunMeta>,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
    tools: Option<ToolHandle>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            reverse_edges: HashMap::new(),
            start: None,
            status: RunStatus::Pending,
            last_error: None,
            last_run: None,
            evaluator: None,
            tools: None,
        }
    }

    /// Inject the evaluator used by scripted nodes.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Attach the tool handle lent to scripted nodes.
    pub fn with_tools(mut self, tools: ToolHandle) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn start_node(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a node. The first node added becomes the start node unless
    /// overridden; re-adding a name replaces the node.
    pub fn add_node(&mut self, node: Node) {
        let name = node.name.clone();
        if self.start.is_none() {
            self.start = Some(name.clone());
        }
        if !self.nodes.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.nodes.insert(name, node);
    }

    /// Add a scripted node from source text; see [`Node::script`].
    pub fn add_script(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.add_node(Node::script(name, source));
    }

    /// Add a conditional node from an expression; see [`Node::condition`].
    pub fn add_condition(&mut self, name: impl Into<String>, expr: impl Into<String>) {
        self.add_node(Node::condition(name, expr));
    }

    /// Designate the start node, overriding the first-added default.
    pub fn set_start(&mut self, name: &str) -> Result<()> {
        if !self.nodes.contains_key(name) {
            return Err(TrellisError::NodeNotFound(name.to_string()));
        }
        self.start = Some(name.to_string());
        Ok(())
    }

    /// Register a directed edge.
    ///
    /// Both names must exist; on failure neither edge map is touched.
    /// Repeating an existing pair is a no-op.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<()> {
        if !self.nodes.contains_key(source) {
            return Err(TrellisError::NodeNotFound(source.to_string()));
        }
        if !self.nodes.contains_key(target) {
            return Err(TrellisError::NodeNotFound(target.to_string()));
        }

        let targets = self.edges.entry(source.to_string()).or_default();
        if !targets.iter().any(|t| t == target) {
            targets.push(target.to_string());
        }
        let sources = self.reverse_edges.entry(target.to_string()).or_default();
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
        Ok(())
    }

    /// Topological order of the current graph (Kahn's algorithm), for
    /// structural inspection. Fails on a cycle. `run` does not use this —
    /// conditional successors are only known after execution.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> =
            self.order.iter().map(|n| (n.as_str(), 0)).collect();
        for targets in self.edges.values() {
            for target in targets {
                if let Some(degree) = in_degree.get_mut(target.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|name| in_degree.get(name) == Some(&0))
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(name) = queue.pop_front() {
            sorted.push(name.to_string());
            if let Some(targets) = self.edges.get(name) {
                for target in targets {
                    if let Some(degree) = in_degree.get_mut(target.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(target.as_str());
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return Err(TrellisError::CyclicGraph);
        }
        Ok(sorted)
    }

    /// Execute the workflow against an input mapping.
    ///
    /// Walks the graph breadth-first from the start node, executing one
    /// node at a time. Each node's input is the merged output of its
    /// already-executed predecessors; each output merges into the shared
    /// context. Conditional nodes pick their branch from their own
    /// output. A node failure aborts the run, keeping everything logged
    /// so far; there are no retries.
    pub async fn run(&mut self, input: Map<String, Value>) -> RunReport {
        let started = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        self.status = RunStatus::Running;
        self.last_error = None;
        info!(workflow = %self.name, run_id = %run_id, "Starting workflow run");

        // Structural failure: nothing has touched the context or a node.
        let start = self.start.clone().filter(|s| self.nodes.contains_key(s));
        let Some(start) = start else {
            let message = TrellisError::MissingStartNode(self.name.clone()).to_string();
            error!(workflow = %self.name, error = %message, "Run aborted");
            return self.finish_run(
                run_id,
                started_at,
                started.elapsed().as_millis() as u64,
                Map::new(),
                Vec::new(),
                Some(message),
            );
        };

        let mut context = Context::with_input(input);
        context.set_metadata("workflow", Value::String(self.name.clone()));
        context.set_metadata("run_id", Value::String(run_id.clone()));

        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(start);
        let mut visited: HashSet<String> = HashSet::new();
        let mut log: Vec<LogEntry> = Vec::new();
        let mut outputs: HashMap<String, Value> = HashMap::new();
        let mut run_error: Option<String> = None;

        while let Some(name) = queue.pop_front() {
            if visited.contains(&name) {
                continue;
            }

            // Inputs: merged outputs of predecessors that have already
            // executed. A node with several incoming paths sees whatever
            // is available at this point in the walk, nothing more.
            let mut gathered = Map::new();
            if let Some(sources) = self.reverse_edges.get(&name) {
                for source in sources {
                    match outputs.get(source) {
                        Some(Value::Object(map)) => gathered.extend(map.clone()),
                        Some(other) => {
                            gathered.insert(source.clone(), other.clone());
                        }
                        None => {}
                    }
                }
            }

            let env = ExecEnv {
                evaluator: self.evaluator.as_ref(),
                tools: self.tools.as_ref(),
            };
            let Some(node) = self.nodes.get_mut(&name) else {
                warn!(node = %name, "Edge references unknown node, skipping");
                continue;
            };

            info!(node = %name, kind = %node.kind, "Executing workflow node");
            let node_started = Instant::now();
            let result = node.execute(&mut context, gathered, env).await;
            let elapsed_ms = node_started.elapsed().as_millis() as u64;
            visited.insert(name.clone());

            match result {
                Ok(value) => {
                    let kind = node.kind;
                    log.push(LogEntry {
                        node: name.clone(),
                        kind,
                        status: NodeStatus::Completed,
                        output: node.output.clone(),
                        error: None,
                        branch: None,
                        elapsed_ms,
                    });
                    debug!(node = %name, elapsed_ms, "Node completed");
                    outputs.insert(name.clone(), value.clone());

                    let targets = self.edges.get(&name).cloned().unwrap_or_default();
                    if kind == NodeKind::Condition && targets.len() >= 2 {
                        let met = value
                            .get("condition_met")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        let next = if met { &targets[0] } else { &targets[1] };
                        debug!(node = %name, condition_met = met, branch = %next, "Branch taken");
                        if let Some(entry) = log.last_mut() {
                            entry.branch = Some(next.clone());
                        }
                        queue.push_back(next.clone());
                    } else {
                        queue.extend(targets);
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(node = %name, error = %message, "Node failed, aborting run");
                    log.push(LogEntry {
                        node: name.clone(),
                        kind: node.kind,
                        status: NodeStatus::Failed,
                        output: None,
                        error: Some(message.clone()),
                        branch: None,
                        elapsed_ms,
                    });
                    run_error = Some(message);
                    break;
                }
            }
        }

        self.finish_run(
            run_id,
            started_at,
            started.elapsed().as_millis() as u64,
            context.snapshot(),
            log,
            run_error,
        )
    }

    /// Structural snapshot for external inspection. Never includes live
    /// context contents.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        let edges = self
            .order
            .iter()
            .flat_map(|source| {
                self.edges
                    .get(source)
                    .into_iter()
                    .flatten()
                    .map(move |target| EdgeSnapshot {
                        source: source.clone(),
                        target: target.clone(),
                    })
            })
            .collect();

        WorkflowSnapshot {
            name: self.name.clone(),
            start_node: self.start.clone(),
            nodes: self
                .order
                .iter()
                .filter_map(|name| self.nodes.get(name))
                .map(Node::snapshot)
                .collect(),
            edges,
            status: self.status,
            last_error: self.last_error.clone(),
            last_run: self.last_run.clone(),
        }
    }

    fn finish_run(
        &mut self,
        run_id: String,
        started_at: chrono::DateTime<Utc>,
        elapsed_ms: u64,
        context: Map<String, Value>,
        execution_log: Vec<LogEntry>,
        error: Option<String>,
    ) -> RunReport {
        let status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.status = status;
        self.last_error = error.clone();
        self.last_run = Some(RunMeta {
            run_id: run_id.clone(),
            status,
            started_at,
            elapsed_ms,
        });
        info!(workflow = %self.name, status = %status, elapsed_ms, "Workflow run finished");

        RunReport {
            workflow: self.name.clone(),
            run_id,
            status,
            context,
            execution_log,
            nodes: self.node_snapshots(),
            error,
            started_at,
            elapsed_ms,
        }
    }

    fn node_snapshots(&self) -> HashMap<String, NodeSnapshot> {
        self.nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.snapshot()))
            .collect()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("nodes", &self.order)
            .field("start", &self.start)
            .field("status", &self.status)
            .finish()
    }
}
