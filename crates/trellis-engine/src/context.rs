use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shared blackboard for one workflow run.
///
/// Every completed node's output merges into the data mapping. The
/// metadata namespace is kept apart and never appears in node inputs.
/// A context is created fresh per run and owned by that run alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    data: Map<String, Value>,
    metadata: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: Map<String, Value>) -> Self {
        Self {
            data: input,
            metadata: Map::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.data.get(key).cloned().unwrap_or(default)
    }

    /// In-place single-key mutation.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Bulk in-place merge; incoming keys win on conflict.
    pub fn update(&mut self, data: Map<String, Value>) {
        self.data.extend(data);
    }

    /// Independent copy of the data mapping. Mutating the copy cannot
    /// touch engine-internal state.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.data.clone()
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_get_set_update() {
        let mut ctx = Context::new();
        ctx.set("name", json!("Ada"));
        assert_eq!(ctx.get("name"), Some(&json!("Ada")));
        assert_eq!(ctx.get("missing"), None);
        assert_eq!(ctx.get_or("missing", json!(0)), json!(0));

        let mut incoming = Map::new();
        incoming.insert("name".into(), json!("Grace"));
        incoming.insert("count".into(), json!(2));
        ctx.update(incoming);

        assert_eq!(ctx.get("name"), Some(&json!("Grace")));
        assert_eq!(ctx.get("count"), Some(&json!(2)));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut ctx = Context::new();
        ctx.set("key", json!(1));

        let mut snapshot = ctx.snapshot();
        snapshot.insert("key".into(), json!(999));
        snapshot.insert("extra".into(), json!(true));

        assert_eq!(ctx.get("key"), Some(&json!(1)));
        assert_eq!(ctx.get("extra"), None);
    }

    #[test]
    fn test_metadata_never_leaks_into_data() {
        let mut ctx = Context::new();
        ctx.set_metadata("run_id", json!("abc"));

        assert!(ctx.snapshot().is_empty());
        assert_eq!(ctx.get("run_id"), None);
        assert_eq!(ctx.get_metadata("run_id"), Some(&json!("abc")));
    }

    #[test]
    fn test_with_input() {
        let mut input = Map::new();
        input.insert("value".into(), json!(21));
        let ctx = Context::with_input(input);
        assert_eq!(ctx.get("value"), Some(&json!(21)));
    }
}
