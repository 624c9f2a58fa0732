use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use trellis_core::config::GatewayConfig;
use trellis_core::error::{Result, TrellisError};
use trellis_core::types::ToolOutcome;

use crate::auth::ToolAuth;
use crate::tool::{GatewayStats, HttpSpec, HttpTool, Tool, ToolFn, ToolKind, ToolSummary};

/// Name-keyed registry of external capabilities.
///
/// Tools are either in-process callables or HTTP endpoint descriptors.
/// `call` never raises: every failure mode (unknown name, body error,
/// HTTP status, timeout) comes back as a structured [`ToolOutcome`].
///
/// The registry lock is held only for map access, never across I/O.
pub struct ToolGateway {
    tools: RwLock<HashMap<String, Tool>>,
    http: reqwest::Client,
    config: GatewayConfig,
}

impl ToolGateway {
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let http = builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build configured HTTP client, using defaults");
            reqwest::Client::new()
        });
        Self {
            tools: RwLock::new(HashMap::new()),
            http,
            config,
        }
    }

    /// Register an in-process callable under a name.
    ///
    /// Registration is an explicit call with a first-class function value;
    /// re-registering a name replaces the previous tool.
    pub fn register_function<F, Fut>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        f: F,
    ) where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let func: ToolFn = std::sync::Arc::new(move |params| Box::pin(f(params)));
        self.insert(Tool {
            name: name.into(),
            description: description.into(),
            category: "function".into(),
            kind: ToolKind::Function(func),
            call_count: 0,
            last_called: None,
        });
    }

    /// Register an HTTP endpoint descriptor.
    pub fn register_http(&self, tool: HttpTool) -> Result<()> {
        let method: Method = tool
            .method
            .to_uppercase()
            .parse()
            .map_err(|_| TrellisError::Config(format!("Invalid HTTP method: {}", tool.method)))?;
        self.insert(Tool {
            name: tool.name,
            description: tool.description,
            category: tool.category,
            kind: ToolKind::Http(HttpSpec {
                method,
                url: tool.url,
                headers: tool.headers,
                auth: tool.auth,
                request_template: tool.request_template,
                response_map: tool.response_map,
                timeout: tool
                    .timeout
                    .unwrap_or(Duration::from_secs(self.config.default_timeout_secs)),
            }),
            call_count: 0,
            last_called: None,
        });
        Ok(())
    }

    /// Register one HTTP tool per operation in an OpenAPI document.
    ///
    /// Tool names come from `operationId` when present, otherwise from the
    /// method and path. Returns the registered names.
    pub fn register_from_openapi(
        &self,
        spec: &Value,
        base_url: Option<&str>,
        auth: ToolAuth,
    ) -> Result<Vec<String>> {
        let base = match base_url {
            Some(base) => base.to_string(),
            None => spec
                .pointer("/servers/0/url")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        };

        let mut registered = Vec::new();
        let Some(paths) = spec.get("paths").and_then(Value::as_object) else {
            return Ok(registered);
        };

        for (path, operations) in paths {
            let Some(operations) = operations.as_object() else {
                continue;
            };
            for (method, details) in operations {
                let method = method.to_uppercase();
                if !matches!(method.as_str(), "GET" | "POST" | "PUT" | "DELETE" | "PATCH") {
                    continue;
                }
                let name = details
                    .get("operationId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        format!("{}_{}", method.to_lowercase(), path.replace('/', "_"))
                    });
                let description = details
                    .get("summary")
                    .or_else(|| details.get("description"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();

                self.register_http(
                    HttpTool::new(&name, format!("{}{}", base, path))
                        .method(&method)
                        .description(description)
                        .auth(auth.clone()),
                )?;
                registered.push(name);
            }
        }
        Ok(registered)
    }

    /// Replace a tool's auth descriptor. Effective on the next call.
    pub fn set_auth(&self, name: &str, auth: ToolAuth) -> bool {
        let mut tools = self.write();
        match tools.get_mut(name) {
            Some(Tool {
                kind: ToolKind::Http(spec),
                ..
            }) => {
                spec.auth = auth;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn summary(&self, name: &str) -> Option<ToolSummary> {
        self.read().get(name).map(Tool::summary)
    }

    /// List tools, optionally restricted to a category.
    pub fn list(&self, category: Option<&str>) -> Vec<ToolSummary> {
        let mut summaries: Vec<ToolSummary> = self
            .read()
            .values()
            .filter(|t| category.map_or(true, |c| t.category == c))
            .map(Tool::summary)
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn remove(&self, name: &str) -> bool {
        let removed = self.write().remove(name).is_some();
        if removed {
            debug!(tool = %name, "Removed tool");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn stats(&self) -> GatewayStats {
        let tools = self.list(None);
        GatewayStats {
            total_tools: tools.len(),
            total_calls: tools.iter().map(|t| t.call_count).sum(),
            tools,
        }
    }

    /// Invoke a tool by name with the tool's own timeout.
    pub async fn call(&self, name: &str, params: Map<String, Value>) -> ToolOutcome {
        self.call_with_timeout(name, params, None).await
    }

    /// Invoke a tool by name, overriding the per-call timeout.
    pub async fn call_with_timeout(
        &self,
        name: &str,
        params: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> ToolOutcome {
        // Resolve the tool and bump its call stats under one short write
        // lock; every resolved call counts, whatever the outcome.
        let resolved = {
            let mut tools = self.write();
            match tools.get_mut(name) {
                Some(tool) => {
                    tool.call_count += 1;
                    tool.last_called = Some(Utc::now());
                    Some(tool.kind.clone())
                }
                None => None,
            }
        };
        let Some(kind) = resolved else {
            warn!(tool = %name, "Tool not found");
            return ToolOutcome::not_found(name, self.list_names());
        };

        debug!(tool = %name, "Invoking tool");
        match kind {
            ToolKind::Function(f) => match f(params).await {
                Ok(result) => ToolOutcome::success(name, result),
                Err(e) => ToolOutcome::failure(name, e.to_string()),
            },
            ToolKind::Http(spec) => self.call_http(name, &spec, params, timeout).await,
        }
    }

    /// Non-suspending calling convention, for call sites that cannot await.
    ///
    /// Reuses an already-active tokio runtime (the calling thread must be
    /// allowed to block, i.e. a multi-thread runtime); with no runtime
    /// active, drives the call on a private current-thread runtime.
    /// Nesting this inside a future produced by [`Self::call`] on the same
    /// runtime is unsafe.
    pub fn call_blocking(&self, name: &str, params: Map<String, Value>) -> ToolOutcome {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tokio::task::block_in_place(|| handle.block_on(self.call(name, params)))
            }
            Err(_) => match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(self.call(name, params)),
                Err(e) => ToolOutcome::failure(name, format!("Failed to build runtime: {}", e)),
            },
        }
    }

    async fn call_http(
        &self,
        name: &str,
        spec: &HttpSpec,
        params: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> ToolOutcome {
        let url = substitute_url(&spec.url, &params);

        let mut headers = HeaderMap::new();
        for (key, value) in &spec.headers {
            if let (Ok(key), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(key, value);
            }
        }
        // Auth resolves per call so a rotated secret is picked up immediately.
        headers.extend(spec.auth.headers());

        let mut request = self
            .http
            .request(spec.method.clone(), url)
            .headers(headers)
            .timeout(timeout.unwrap_or(spec.timeout));
        if let Some(body) = build_body(spec, &params) {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ToolOutcome::timeout(name),
            Err(e) => return ToolOutcome::failure(name, e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            return ToolOutcome::http_status(name, status.as_u16());
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) if e.is_timeout() => return ToolOutcome::timeout(name),
            Err(e) => return ToolOutcome::failure(name, e.to_string()),
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(decoded) => {
                let result = if spec.response_map.is_empty() {
                    decoded
                } else {
                    remap_response(&decoded, &spec.response_map)
                };
                ToolOutcome::success(name, result).with_status(status.as_u16())
            }
            // Non-JSON bodies pass through as raw text.
            Err(_) => ToolOutcome::success(name, Value::String(text)).with_status(status.as_u16()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Tool>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Tool>> {
        self.tools.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, tool: Tool) {
        debug!(tool = %tool.name, category = %tool.category, "Registered tool");
        self.write().insert(tool.name.clone(), tool);
    }
}

impl Default for ToolGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Substitute `{key}` placeholders in the URL text from params.
///
/// All-or-nothing: if any placeholder has no matching param, the URL is
/// returned untouched.
fn substitute_url(url: &str, params: &Map<String, Value>) -> String {
    if !url.contains('{') {
        return url.to_string();
    }

    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            return url.to_string();
        };
        let key = &rest[open + 1..open + close];
        match params.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => return url.to_string(),
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

/// Build the request body: template merged with params when a template
/// exists (an unparseable template degrades to the bare params), else
/// params for mutating methods, else none.
fn build_body(spec: &HttpSpec, params: &Map<String, Value>) -> Option<String> {
    if let Some(template) = &spec.request_template {
        let merged = match serde_json::from_str::<Value>(template) {
            Ok(Value::Object(mut base)) => {
                base.extend(params.clone());
                Value::Object(base)
            }
            _ => Value::Object(params.clone()),
        };
        return serde_json::to_string(&merged).ok();
    }
    if spec.method == Method::POST || spec.method == Method::PUT || spec.method == Method::PATCH {
        return serde_json::to_string(&Value::Object(params.clone())).ok();
    }
    None
}

/// Apply a response remap: each output key resolves by walking a dotted
/// path through the decoded body.
fn remap_response(body: &Value, map: &[(String, String)]) -> Value {
    let mut out = Map::new();
    for (key, path) in map {
        out.insert(key.clone(), walk_path(body, path));
    }
    Value::Object(out)
}

/// Walk a dotted path; missing or non-object segments resolve to an empty
/// mapping rather than an error.
fn walk_path(body: &Value, path: &str) -> Value {
    let mut current = body.clone();
    for segment in path.split('.') {
        current = match current.get(segment) {
            Some(value) => value.clone(),
            None => Value::Object(Map::new()),
        };
    }
    current
}
