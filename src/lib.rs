//! # Sub-Agent Execution Engine
//!
//! Embeds non-interactive, tool-using LLM sub-agents inside a larger conversational host.
//! An [`AgentDefinition`] describes one agent (prompt, model, tools, run limits); an
//! [`Executor`] drives it turn by turn until it calls `complete_task`, runs out of turns or
//! time, or is interrupted by the operator.
//!
//! ## What this crate does not do
//!
//! The actual model transport — the HTTP/SSE call to a hosted or local model server — is a
//! host concern, injected via [`chat::RemoteModelTransport`] or [`chat::LocalModelTransport`].
//! This crate only consumes the narrow streaming interface those traits expose, so the whole
//! driver loop can be exercised against a mock transport with no network involved.
//!
//! ## Two chat modes
//!
//! - **Remote**: a natively function-calling provider. [`chat::RemoteChatAdapter`] hands tool
//!   schemas straight to the transport and accumulates native tool calls off the stream.
//! - **Local**: a text-only local model reached over an OpenAI-compatible endpoint.
//!   [`chat::LocalChatAdapter`] injects a Gemma-compatible rendering of the tool schemas into
//!   the system prompt and the executor parses tool calls back out of the generated text.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use subagent_exec::prelude::*;
//!
//! # async fn run(transport: Arc<dyn RemoteModelTransport>, tool_registry: Arc<dyn ToolRegistry>) -> Result<()> {
//! let definition = AgentDefinition::builder("researcher")
//!     .system_prompt_template("You are a researcher. Investigate {topic}.")
//!     .model(ModelConfig::Remote { model: "gemini-2.0".into(), temperature: None, max_output_tokens: None })
//!     .output(OutputSpec::new("summary", serde_json::json!({"type": "string"})))
//!     .build()?;
//!
//! let host = HostContext::new(tool_registry);
//! let chat = ChatAdapter::Remote(RemoteChatAdapter::new(transport));
//! let (activity_sink, mut activity_rx) = activity::channel();
//! let mut executor = Executor::new(definition, host, chat, activity_sink, None)?;
//!
//! let mut inputs = HashMap::new();
//! inputs.insert("topic".to_string(), "rust async runtimes".to_string());
//! let outcome = executor.run(inputs, tokio_util::sync::CancellationToken::new()).await?;
//! println!("{:?}: {}", outcome.termination_reason, outcome.result);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Activity event stream: a typed, fire-and-forget channel the executor uses to report
/// progress (thoughts, tool calls, errors) to the host UI.
pub mod activity;

/// The invocation boundary bridging a parent agent's delegation into a child
/// [`executor::Executor`] run: interrupt-manager session lifecycle, activity forwarding,
/// and the soft-interrupt rendezvous.
pub mod boundary;

/// Chat adapters: [`chat::RemoteChatAdapter`] (native tool calls) and
/// [`chat::LocalChatAdapter`] (text-parsed), each orchestrating a host-injected transport.
pub mod chat;

/// Provider configuration helpers for resolving endpoint/model names from environment
/// variables with a provider-default fallback.
pub mod config;

/// Context-window bookkeeping: token estimation and history truncation for the local
/// chat adapter.
pub mod context;

/// Agent definition: the immutable, validate-at-construction description of one agent.
pub mod definition;

/// Error types and conversions used throughout the crate.
pub mod error;

/// Lifecycle hooks: `PreToolUse`, `PostToolUse`, and `UserPromptSubmit` interception points.
pub mod hooks;

/// The executor: turn state machine, completion-tool protocol, tool dispatch, and recovery
/// turn. The heart of the crate.
pub mod executor;

/// Process-wide interrupt manager: a LIFO stack of per-agent cancellation frames.
pub mod interrupt;

/// Exponential backoff with jitter for transient failures opening a model stream.
pub mod retry;

/// The local-model-only tool-output summarizer.
pub mod summarizer;

/// Tool-call parser: JSON-first with a regex fallback for local models that don't always
/// close their JSON cleanly.
pub mod tool_parser;

/// Tool definition and registry system: the non-interactive allow-list, `ToolRegistry`
/// trait, and the filtered registry an executor resolves an agent's tools against.
pub mod tools;

/// Core wire/turn data model: `TurnMessage`, `ToolInvocation`, `ToolResponse`,
/// `TerminationReason`.
pub mod types;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

pub use error::{Error, Result};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The common entry points for embedding a sub-agent. `use subagent_exec::prelude::*;` pulls
/// in the definition/builder types, the executor and its host context, both chat adapters and
/// their transport traits, the tool registry contract, and the error type.
pub mod prelude {
    pub use crate::activity::{self, ActivityEvent, ActivityKind, ActivitySink};
    pub use crate::chat::{
        ChatAdapter, LocalChatAdapter, LocalModelTransport, RemoteChatAdapter, RemoteModelTransport,
    };
    pub use crate::config::Provider;
    pub use crate::definition::{
        AgentDefinition, AgentDefinitionBuilder, InputSpec, ModelConfig, OutputSpec, PromptConfig, RunConfig,
    };
    pub use crate::error::{Error, Result};
    pub use crate::executor::{Executor, HostContext};
    pub use crate::hooks::{HookDecision, Hooks, PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent};
    pub use crate::tools::{Tool, ToolBuilder, ToolRegistry, tool};
    pub use crate::types::{RunOutcome, TerminationReason, ToolInvocation, ToolResponse, TurnMessage};
}
