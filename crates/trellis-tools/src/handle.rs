use std::sync::Arc;

use serde_json::{Map, Value};

use trellis_core::types::ToolOutcome;

use crate::gateway::ToolGateway;

/// Call-by-name shorthand handed to scripted node bodies.
///
/// Optionally restricted to an allow-list of tool names; calls outside the
/// list fail with a structured outcome without reaching the gateway.
#[derive(Clone)]
pub struct ToolHandle {
    gateway: Arc<ToolGateway>,
    allowed: Option<Vec<String>>,
}

impl ToolHandle {
    pub fn new(gateway: Arc<ToolGateway>) -> Self {
        Self {
            gateway,
            allowed: None,
        }
    }

    pub fn with_allowed(gateway: Arc<ToolGateway>, allowed: Vec<String>) -> Self {
        Self {
            gateway,
            allowed: Some(allowed),
        }
    }

    pub async fn call(&self, name: &str, params: Map<String, Value>) -> ToolOutcome {
        if !self.allows(name) {
            return ToolOutcome::failure(name, format!("Tool '{}' is not allowed in this scope", name));
        }
        self.gateway.call(name, params).await
    }

    /// Non-suspending variant; see [`ToolGateway::call_blocking`].
    pub fn call_blocking(&self, name: &str, params: Map<String, Value>) -> ToolOutcome {
        if !self.allows(name) {
            return ToolOutcome::failure(name, format!("Tool '{}' is not allowed in this scope", name));
        }
        self.gateway.call_blocking(name, params)
    }

    fn allows(&self, name: &str) -> bool {
        match &self.allowed {
            Some(allowed) => allowed.iter().any(|a| a == name),
            None => true,
        }
    }
}

impl std::fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHandle")
            .field("allowed", &self.allowed)
            .finish()
    }
}
