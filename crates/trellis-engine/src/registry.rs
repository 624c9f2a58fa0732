use std::collections::HashMap;

use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::WorkflowSnapshot;

use crate::workflow::Workflow;

/// In-memory, name-keyed table of workflows.
///
/// Explicitly constructed and owned by the embedding service; workflows
/// live here only for the process lifetime, there is no persistence.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Workflow>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty workflow under a unique name.
    pub fn create(&mut self, name: impl Into<String>) -> Result<&mut Workflow> {
        let name = name.into();
        if self.workflows.contains_key(&name) {
            return Err(TrellisError::WorkflowExists(name));
        }
        debug!(workflow = %name, "Created workflow");
        Ok(self
            .workflows
            .entry(name.clone())
            .or_insert_with(|| Workflow::new(name)))
    }

    /// Insert a pre-built workflow, replacing any previous one of the
    /// same name.
    pub fn insert(&mut self, workflow: Workflow) {
        self.workflows.insert(workflow.name().to_string(), workflow);
    }

    pub fn get(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Workflow> {
        self.workflows
            .get_mut(name)
            .ok_or_else(|| TrellisError::WorkflowNotFound(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.workflows.remove(name).is_some();
        if removed {
            debug!(workflow = %name, "Deleted workflow");
        }
        removed
    }

    /// Structural snapshots of every workflow, sorted by name.
    pub fn list(&self) -> Vec<WorkflowSnapshot> {
        let mut snapshots: Vec<WorkflowSnapshot> =
            self.workflows.values().map(Workflow::snapshot).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
