//! # Tool System (C5, consumed contract + definition helpers)
//!
//! Two things live here, grounded on the teacher's `Tool`/`ToolBuilder`/`tool()` API:
//!
//! 1. [`Tool`] / [`ToolBuilder`] / [`tool()`] — the same ergonomic way to *define* a tool
//!    with a typed JSON-schema parameter list and an async handler.
//! 2. [`ToolRegistry`] — the trait the executor *consumes* (spec §4.5): `get_tool`,
//!    `get_function_declarations_filtered`, `execute`. The host's real tool set (filesystem,
//!    shell, grep, ...) lives behind this trait; the core never sees concrete tool
//!    implementations, only schemas and invocation results.
//!
//! [`FilteredToolRegistry`] is the per-agent filtered view the executor builds in
//! `Executor::new` (spec §4.1.1): names resolve against a host registry, full tool
//! instances are adopted verbatim, and raw declarations are schema-only until invoked, at
//! which point execution is deferred back to the host registry by name.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{ToolInvocation, ToolResponse};

/// The non-interactive allow-list (spec §7): tools safe to run without an operator in the
/// loop. Anything requesting interactive confirmation is excluded by construction — it is
/// simply never on this list.
pub const NON_INTERACTIVE_ALLOW_LIST: &[&str] = &[
    "directory_listing",
    "file_read",
    "content_grep",
    "glob",
    "multi_file_read",
    "memory",
    "shell",
    "web_search",
];

pub fn is_allow_listed(name: &str) -> bool {
    NON_INTERACTIVE_ALLOW_LIST.contains(&name)
}

/// A provider-agnostic JSON function-declaration schema, prompted to the model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters_json_schema: Value,
}

// ============================================================================
// TOOL DEFINITION (builder)
// ============================================================================

type ToolFuture = Pin<Box<dyn Future<Output = Result<(Value, String)>> + Send>>;
type ToolHandlerFn = dyn Fn(Value) -> ToolFuture + Send + Sync;

/// A tool definition with name, description, JSON schema, and async handler. Created with
/// [`ToolBuilder`] or the [`tool`] convenience function.
pub struct Tool {
    pub name: String,
    pub description: String,
    properties: Map<String, Value>,
    required: Vec<String>,
    handler: Arc<ToolHandlerFn>,
}

impl Tool {
    pub fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters_json_schema: serde_json::json!({
                "type": "object",
                "properties": Value::Object(self.properties.clone()),
                "required": self.required,
            }),
        }
    }

    pub async fn invoke(&self, arguments: Value) -> Result<(Value, String)> {
        (self.handler)(arguments).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing [`Tool`]s with fluent parameter definition.
pub struct ToolBuilder {
    name: String,
    description: String,
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    /// Add a parameter. `json_type` is a JSON-schema primitive (`"string"`, `"number"`,
    /// `"boolean"`, `"object"`, `"array"`).
    pub fn param(mut self, name: impl Into<String>, json_type: &str, description: impl Into<String>, required: bool) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            serde_json::json!({ "type": json_type, "description": description.into() }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    pub fn handler<F, Fut>(self, f: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(Value, String)>> + Send + 'static,
    {
        Tool {
            name: self.name,
            description: self.description,
            properties: self.properties,
            required: self.required,
            handler: Arc::new(move |args| Box::pin(f(args))),
        }
    }
}

/// Convenience function to start building a tool.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

// ============================================================================
// TOOL REGISTRY (consumed contract, C5)
// ============================================================================

/// Callback invoked with partial tool output as it streams in; the executor wires this to
/// `ActivityKind::ToolOutputChunk`.
pub type OutputChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// The host's tool source, as consumed by the executor (spec §4.5). Registries are treated
/// as isolated per agent: mutations in a child's filtered view never leak to the parent's.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    fn get_tool(&self, name: &str) -> Option<Arc<Tool>>;

    fn get_function_declarations_filtered(&self, names: &[String]) -> Vec<FunctionDeclaration>;

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        cancel: CancellationToken,
        on_output_chunk: OutputChunkCallback,
    ) -> Result<ToolResponse>;
}

/// A simple in-process registry of locally-defined [`Tool`]s. Sufficient for tests and for
/// hosts that don't need a more elaborate backing store.
#[derive(Default)]
pub struct StaticToolRegistry {
    tools: HashMap<String, Arc<Tool>>,
}

impl StaticToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Tool) -> &mut Self {
        self.tools.insert(tool.name.clone(), Arc::new(tool));
        self
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    fn get_tool(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.get(name).cloned()
    }

    fn get_function_declarations_filtered(&self, names: &[String]) -> Vec<FunctionDeclaration> {
        names.iter().filter_map(|n| self.tools.get(n)).map(|t| t.declaration()).collect()
    }

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        _cancel: CancellationToken,
        _on_output_chunk: OutputChunkCallback,
    ) -> Result<ToolResponse> {
        let tool = self
            .tools
            .get(&invocation.name)
            .ok_or_else(|| Error::tool(format!("tool '{}' not found", invocation.name)))?;
        match tool.invoke(Value::Object(invocation.arguments.clone())).await {
            Ok((content, display)) => Ok(ToolResponse::success(&invocation.call_id, &invocation.name, content, display)),
            Err(e) => Ok(ToolResponse::error(&invocation.call_id, &invocation.name, e.to_string())),
        }
    }
}

// ============================================================================
// TOOL REFERENCES + FILTERED VIEW (executor construction, spec §4.1.1)
// ============================================================================

/// How a tool is referenced from an [`crate::definition::AgentDefinition`]'s tool
/// configuration.
#[derive(Debug, Clone)]
pub enum ToolReference {
    /// Resolve by name against the host's global registry.
    Name(String),
    /// A raw schema with no adopted implementation; deferred to schema-only use until
    /// invoked, at which point execution falls back to the host registry by name.
    Declaration(FunctionDeclaration),
    /// A full tool instance, adopted verbatim.
    Instance(Arc<Tool>),
}

impl ToolReference {
    fn name(&self) -> &str {
        match self {
            ToolReference::Name(n) => n,
            ToolReference::Declaration(d) => &d.name,
            ToolReference::Instance(t) => &t.name,
        }
    }
}

enum ResolvedTool {
    Instance(Arc<Tool>),
    SchemaOnly(FunctionDeclaration),
}

/// The per-agent filtered view of the host's tool set (spec §4.1.1, §4.5). Built once at
/// `Executor::new`; every resolved tool has already passed the non-interactive allow-list
/// check by the time this type exists.
pub struct FilteredToolRegistry {
    host: Arc<dyn ToolRegistry>,
    resolved: HashMap<String, ResolvedTool>,
}

impl FilteredToolRegistry {
    /// Resolve `refs` against `host`, rejecting any tool not on the non-interactive
    /// allow-list. This is the one place spec §4.1.1's `ConfigurationError` can originate
    /// from tool resolution.
    pub fn build(host: Arc<dyn ToolRegistry>, refs: &[ToolReference]) -> Result<Self> {
        let mut resolved = HashMap::new();
        for reference in refs {
            let name = reference.name().to_string();
            if !is_allow_listed(&name) {
                return Err(Error::config(format!(
                    "tool '{name}' is not on the non-interactive allow-list"
                )));
            }
            let entry = match reference {
                ToolReference::Instance(t) => ResolvedTool::Instance(t.clone()),
                ToolReference::Declaration(d) => ResolvedTool::SchemaOnly(d.clone()),
                ToolReference::Name(n) => match host.get_tool(n) {
                    Some(t) => ResolvedTool::Instance(t),
                    None => {
                        return Err(Error::config(format!("tool '{n}' not found in host registry")));
                    }
                },
            };
            resolved.insert(name, entry);
        }
        Ok(Self { host, resolved })
    }

    pub fn is_authorized(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }

    pub fn authorized_names(&self) -> Vec<String> {
        self.resolved.keys().cloned().collect()
    }
}

#[async_trait]
impl ToolRegistry for FilteredToolRegistry {
    fn get_tool(&self, name: &str) -> Option<Arc<Tool>> {
        match self.resolved.get(name)? {
            ResolvedTool::Instance(t) => Some(t.clone()),
            ResolvedTool::SchemaOnly(_) => self.host.get_tool(name),
        }
    }

    fn get_function_declarations_filtered(&self, names: &[String]) -> Vec<FunctionDeclaration> {
        names
            .iter()
            .filter_map(|n| match self.resolved.get(n)? {
                ResolvedTool::Instance(t) => Some(t.declaration()),
                ResolvedTool::SchemaOnly(d) => Some(d.clone()),
            })
            .collect()
    }

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        cancel: CancellationToken,
        on_output_chunk: OutputChunkCallback,
    ) -> Result<ToolResponse> {
        if !self.is_authorized(&invocation.name) {
            return Ok(ToolResponse::error(&invocation.call_id, &invocation.name, "Unauthorized tool call"));
        }
        match self.resolved.get(&invocation.name) {
            Some(ResolvedTool::Instance(tool)) => {
                match tool.invoke(Value::Object(invocation.arguments.clone())).await {
                    Ok((content, display)) => Ok(ToolResponse::success(&invocation.call_id, &invocation.name, content, display)),
                    Err(e) => Ok(ToolResponse::error(&invocation.call_id, &invocation.name, e.to_string())),
                }
            }
            _ => self.host.execute(invocation, cancel, on_output_chunk).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> Tool {
        tool("echo", "echoes its input").param("text", "string", "text to echo", true).handler(|args| async move {
            let text = args.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
            Ok((json!({ "echoed": text }), format!("echoed: {text}")))
        })
    }

    #[test]
    fn allow_list_rejects_unknown_tools() {
        assert!(is_allow_listed("shell"));
        assert!(!is_allow_listed("interactive_confirm"));
    }

    #[tokio::test]
    async fn static_registry_executes_registered_tool() {
        let mut registry = StaticToolRegistry::new();
        registry.register(echo_tool());

        let invocation = ToolInvocation::new("c-0", "echo", serde_json::json!({"text": "hi"}).as_object().unwrap().clone());
        let response = registry.execute(&invocation, CancellationToken::new(), Arc::new(|_| {})).await.unwrap();
        assert!(!response.is_error());
    }

    #[tokio::test]
    async fn filtered_registry_rejects_tool_not_in_refs() {
        let mut host = StaticToolRegistry::new();
        host.register(echo_tool());
        let host: Arc<dyn ToolRegistry> = Arc::new(host);

        let filtered = FilteredToolRegistry::build(host, &[ToolReference::Name("shell".to_string())]);
        // "shell" is allow-listed but not registered on the host -> config error.
        assert!(filtered.is_err());
    }

    #[test]
    fn build_fails_for_non_allow_listed_tool() {
        let host: Arc<dyn ToolRegistry> = Arc::new(StaticToolRegistry::new());
        let err = FilteredToolRegistry::build(host, &[ToolReference::Name("interactive_confirm".to_string())]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn unauthorized_invocation_never_reaches_handler() {
        let mut host = StaticToolRegistry::new();
        host.register(echo_tool());
        host.register(
            tool("memory", "memory tool")
                .handler(|_| async move { Ok((Value::Null, "ok".to_string())) }),
        );
        let host: Arc<dyn ToolRegistry> = Arc::new(host);
        let filtered = FilteredToolRegistry::build(host, &[ToolReference::Name("memory".to_string())]).unwrap();

        let invocation = ToolInvocation::new("c-0", "echo", Map::new());
        let response = filtered.execute(&invocation, CancellationToken::new(), Arc::new(|_| {})).await.unwrap();
        assert!(response.is_error());
    }
}
