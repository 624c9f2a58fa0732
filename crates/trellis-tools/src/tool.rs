use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use trellis_core::error::Result;

use crate::auth::ToolAuth;

/// Async callable backing a function-mode tool.
///
/// Receives the call parameters as a map; a body that needs nothing may
/// ignore it. Bodies that resolve immediately and bodies that suspend
/// both fit this shape.
pub type ToolFn = Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Invocation mode of a registered tool.
#[derive(Clone)]
pub enum ToolKind {
    /// In-process callable.
    Function(ToolFn),
    /// HTTP-backed endpoint.
    Http(HttpSpec),
}

impl std::fmt::Debug for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function"),
            Self::Http(spec) => f.debug_tuple("Http").field(spec).finish(),
        }
    }
}

/// HTTP invocation descriptor.
#[derive(Debug, Clone)]
pub struct HttpSpec {
    pub method: reqwest::Method,
    /// URL text, with optional `{param}` placeholders.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub auth: ToolAuth,
    /// Raw JSON template merged under the call params, when present.
    pub request_template: Option<String>,
    /// Output key → dotted path into the decoded response body.
    pub response_map: Vec<(String, String)>,
    pub timeout: Duration,
}

/// A registered external capability.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub category: String,
    pub kind: ToolKind,
    pub call_count: u64,
    pub last_called: Option<DateTime<Utc>>,
}

impl Tool {
    pub fn summary(&self) -> ToolSummary {
        let (method, url) = match &self.kind {
            ToolKind::Function(_) => (None, None),
            ToolKind::Http(spec) => (Some(spec.method.to_string()), Some(spec.url.clone())),
        };
        ToolSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            method,
            url,
            call_count: self.call_count,
            last_called: self.last_called,
        }
    }
}

/// Serializable view of a tool, for listings and stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub call_count: u64,
    pub last_called: Option<DateTime<Utc>>,
}

/// Aggregate call statistics for a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStats {
    pub total_tools: usize,
    pub total_calls: u64,
    pub tools: Vec<ToolSummary>,
}

/// Builder for registering an HTTP tool.
#[derive(Debug, Clone)]
pub struct HttpTool {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) category: String,
    pub(crate) method: String,
    pub(crate) url: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) auth: ToolAuth,
    pub(crate) request_template: Option<String>,
    pub(crate) response_map: Vec<(String, String)>,
    pub(crate) timeout: Option<Duration>,
}

impl HttpTool {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: "http".into(),
            method: "GET".into(),
            url: url.into(),
            headers: Vec::new(),
            auth: ToolAuth::None,
            request_template: None,
            response_map: Vec::new(),
            timeout: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn auth(mut self, auth: ToolAuth) -> Self {
        self.auth = auth;
        self
    }

    /// JSON body template; call params are merged over it.
    pub fn request_template(mut self, template: impl Into<String>) -> Self {
        self.request_template = Some(template.into());
        self
    }

    /// Map an output key to a dotted path into the response body.
    pub fn map_response(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.response_map.push((key.into(), path.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_tool_builder() {
        let tool = HttpTool::new("weather", "https://api.example.com/current")
            .description("Current weather")
            .method("post")
            .header("X-Trace", "1")
            .map_response("temp", "data.current.temp")
            .timeout(Duration::from_secs(5));

        assert_eq!(tool.name, "weather");
        assert_eq!(tool.method, "post");
        assert_eq!(tool.headers.len(), 1);
        assert_eq!(tool.response_map[0].1, "data.current.temp");
        assert_eq!(tool.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_summary_for_http_tool() {
        let tool = Tool {
            name: "api".into(),
            description: String::new(),
            category: "http".into(),
            kind: ToolKind::Http(HttpSpec {
                method: reqwest::Method::GET,
                url: "https://example.com".into(),
                headers: Vec::new(),
                auth: ToolAuth::None,
                request_template: None,
                response_map: Vec::new(),
                timeout: Duration::from_secs(30),
            }),
            call_count: 3,
            last_called: None,
        };

        let summary = tool.summary();
        assert_eq!(summary.method.as_deref(), Some("GET"));
        assert_eq!(summary.url.as_deref(), Some("https://example.com"));
        assert_eq!(summary.call_count, 3);
    }
}
