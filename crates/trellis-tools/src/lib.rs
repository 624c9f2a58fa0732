//! Tool Gateway — registry of named external capabilities.
//!
//! A [`ToolGateway`] maps names to tools: in-process async callables or
//! HTTP endpoint descriptors with auth, request templates, and response
//! remaps. Scripted workflow nodes reach it through a [`ToolHandle`],
//! which enforces an optional capability allow-list.
//!
//! Calls never raise. Unknown names, body errors, HTTP status errors, and
//! timeouts all come back as structured `ToolOutcome` data so callers can
//! branch on `success` without exception handling.

pub mod auth;
pub mod gateway;
pub mod handle;
pub mod tool;

pub use auth::ToolAuth;
pub use gateway::ToolGateway;
pub use handle::ToolHandle;
pub use tool::{GatewayStats, HttpSpec, HttpTool, Tool, ToolFn, ToolKind, ToolSummary};
