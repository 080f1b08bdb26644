//! # Activity Channel (C9)
//!
//! A typed, one-way event stream from the [`crate::executor::Executor`] toward a host UI.
//! The channel has no back-pressure contract beyond "delivered in emission order" (spec
//! §3); an unbounded `tokio::sync::mpsc` channel gives us exactly that without making the
//! executor's hot path block on a slow UI consumer.

use serde_json::Value;
use tokio::sync::mpsc;

/// The kind of progress being reported. New kinds are additive; existing ones are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ActivityKind {
    ThoughtChunk,
    ToolCallStart,
    ToolCallEnd,
    ToolOutputChunk,
    Error,
    Interrupted,
    UserMessage,
}

/// One typed, fire-and-forget progress event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ActivityEvent {
    /// Always `true`. Lets a host routing events from several sources tell a sub-agent's
    /// activity apart from its own top-level chat turns without a type-name lookup.
    pub is_subagent_activity: bool,
    pub agent_name: String,
    pub kind: ActivityKind,
    pub data: Value,
}

impl ActivityEvent {
    pub fn new(agent_name: impl Into<String>, kind: ActivityKind, data: Value) -> Self {
        Self {
            is_subagent_activity: true,
            agent_name: agent_name.into(),
            kind,
            data,
        }
    }

    pub fn thought_chunk(agent_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(agent_name, ActivityKind::ThoughtChunk, Value::String(text.into()))
    }

    pub fn tool_call_start(agent_name: impl Into<String>, name: &str, arguments: &Value) -> Self {
        Self::new(
            agent_name,
            ActivityKind::ToolCallStart,
            serde_json::json!({ "name": name, "arguments": arguments }),
        )
    }

    pub fn tool_call_end(agent_name: impl Into<String>, name: &str, call_id: &str, success: bool) -> Self {
        Self::new(
            agent_name,
            ActivityKind::ToolCallEnd,
            serde_json::json!({ "name": name, "call_id": call_id, "success": success }),
        )
    }

    /// A `tool_output_chunk` arriving with no preceding `tool_call_start` is a known
    /// upstream quirk (spec §9) — the host UI handles it with a synthetic empty name; this
    /// constructor preserves that behavior rather than fixing it silently.
    pub fn tool_output_chunk(agent_name: impl Into<String>, call_id: &str, chunk: impl Into<String>) -> Self {
        Self::new(
            agent_name,
            ActivityKind::ToolOutputChunk,
            serde_json::json!({ "call_id": call_id, "chunk": chunk.into() }),
        )
    }

    pub fn error(agent_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(agent_name, ActivityKind::Error, Value::String(message.into()))
    }

    pub fn interrupted(agent_name: impl Into<String>) -> Self {
        Self::new(agent_name, ActivityKind::Interrupted, Value::Null)
    }

    pub fn user_message(agent_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(agent_name, ActivityKind::UserMessage, Value::String(text.into()))
    }
}

/// Write-only handle the executor uses to emit activity. Cloneable; cheap to pass down
/// into concurrently-dispatched tool executions.
#[derive(Clone)]
pub struct ActivitySink {
    tx: mpsc::UnboundedSender<ActivityEvent>,
}

impl ActivitySink {
    /// Emit an event. Never blocks; silently drops if the receiver has been dropped
    /// (a host that stopped listening shouldn't be able to stall agent execution).
    pub fn emit(&self, event: ActivityEvent) {
        let _ = self.tx.send(event);
    }
}

/// The consuming half, typically forwarded into a UI render loop.
pub struct ActivityReceiver {
    rx: mpsc::UnboundedReceiver<ActivityEvent>,
}

impl ActivityReceiver {
    pub async fn recv(&mut self) -> Option<ActivityEvent> {
        self.rx.recv().await
    }
}

/// Create a fresh activity channel.
pub fn channel() -> (ActivitySink, ActivityReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ActivitySink { tx }, ActivityReceiver { rx })
}
