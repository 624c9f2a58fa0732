//! Workflow Graph Engine — node/edge/context model and traversal.
//!
//! A [`Workflow`] is a directed graph of [`Node`]s connected by edges.
//! `run` walks the graph breadth-first from the start node, merging each
//! node's predecessor outputs into its input, folding every output into
//! a shared [`Context`] blackboard, and picking conditional branches from
//! the executing node's own output.
//!
//! Scripted nodes never execute source text directly: the embedding
//! service injects a [`ScriptEvaluator`], and scripts reach external
//! capabilities only through the tool handle bound into their scope.

pub mod condition;
pub mod context;
pub mod node;
pub mod registry;
pub mod script;
pub mod workflow;

pub use context::Context;
pub use node::{Body, ExecEnv, Node, NodeFn, ThunkFn};
pub use registry::WorkflowRegistry;
pub use script::{ScriptEvaluator, ScriptScope};
pub use workflow::Workflow;
