//! Shared test doubles for the executor integration suite.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use subagent_exec::chat::ModelStreamEvent;
use subagent_exec::prelude::*;
use subagent_exec::tools::{FunctionDeclaration, StaticToolRegistry};
use subagent_exec::types::ToolInvocation;

/// Serializes every test in this binary that drives an `Executor::run` to completion, since
/// `Executor::run` pushes/pops a frame on the process-wide interrupt-manager singleton and
/// cargo runs tests in one binary on multiple threads by default.
pub fn serial() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    match LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One scripted remote turn.
pub enum ScriptedTurn {
    /// A single native tool call, e.g. `complete_task` or `shell`.
    ToolCall { name: &'static str, arguments: serde_json::Value },
    /// Plain text with no tool call (exercises the no-complete-task path).
    Text(String),
    /// A stream that never resolves on its own — only the turn's cancellation ends it.
    /// Used to exercise the soft-interrupt path.
    Pending,
}

/// A [`RemoteModelTransport`] that replays a fixed queue of turns, one per call, in order.
pub struct ScriptedRemoteTransport {
    turns: Mutex<std::collections::VecDeque<ScriptedTurn>>,
}

impl ScriptedRemoteTransport {
    pub fn new(turns: Vec<ScriptedTurn>) -> Arc<Self> {
        Arc::new(Self { turns: Mutex::new(turns.into_iter().collect()) })
    }
}

#[async_trait]
impl RemoteModelTransport for ScriptedRemoteTransport {
    async fn send_message_stream(
        &self,
        _history: &[TurnMessage],
        _tool_schemas: &[FunctionDeclaration],
        cancel: CancellationToken,
    ) -> subagent_exec::Result<BoxStream<'static, subagent_exec::Result<ModelStreamEvent>>> {
        let turn = self.turns.lock().unwrap().pop_front();
        match turn {
            Some(ScriptedTurn::ToolCall { name, arguments }) => {
                let invocation =
                    ToolInvocation::new("call-0", name, arguments.as_object().cloned().unwrap_or_default());
                let events = vec![
                    Ok(ModelStreamEvent::ToolCall(invocation)),
                    Ok(ModelStreamEvent::Finished { finish_reason: Some("tool_calls".into()) }),
                ];
                Ok(futures::stream::iter(events).boxed())
            }
            Some(ScriptedTurn::Text(text)) => {
                let events = vec![
                    Ok(ModelStreamEvent::TextDelta(text)),
                    Ok(ModelStreamEvent::Finished { finish_reason: Some("stop".into()) }),
                ];
                Ok(futures::stream::iter(events).boxed())
            }
            // No scripted turn left to return: block until the caller cancels us, rather
            // than returning an empty stream that would read as an immediate protocol
            // violation.
            Some(ScriptedTurn::Pending) | None => {
                cancel.cancelled().await;
                Ok(futures::stream::empty().boxed())
            }
        }
    }
}

/// Builds a host tool registry with a single `shell` tool that always succeeds, echoing its
/// `command` argument back as the tool content.
pub fn shell_tool_registry() -> Arc<dyn ToolRegistry> {
    let mut registry = StaticToolRegistry::new();
    registry.register(tool("shell", "runs a shell command").param("command", "string", "command to run", true).handler(
        |args| async move {
            let command = args.get("command").and_then(serde_json::Value::as_str).unwrap_or_default().to_string();
            Ok((serde_json::json!({"stdout": format!("ran: {command}")}), format!("ran: {command}")))
        },
    ));
    Arc::new(registry)
}

pub fn remote_definition(output: Option<OutputSpec>) -> AgentDefinitionBuilder {
    let mut builder = AgentDefinition::builder("tester")
        .system_prompt_template("You are a test agent working on {task}.")
        .tool(subagent_exec::tools::ToolReference::Name("shell".into()))
        .model(ModelConfig::Remote { model: "gemini-2.0".into(), temperature: None, max_output_tokens: None });
    if let Some(output) = output {
        builder = builder.output(output);
    }
    builder
}
