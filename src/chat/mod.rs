//! # Chat Adapters (C3, C4)
//!
//! Two adapters over two narrow streaming transport traits (spec §1: the transports
//! themselves — a remote streaming RPC, a local streaming RPC — are external collaborators;
//! the core only consumes them). Model polymorphism is a capability set of one bit
//! (`supports_native_tool_calls`), resolved once at [`crate::executor::Executor`]
//! construction (spec §9) — never an open-recursion `call_model` shared between the two.
//!
//! Both variants share the same result shape, [`ModelTurnResult`], and both accept an
//! `on_chunk` callback so the executor can emit `thought-chunk` activity as the turn
//! streams in, without the adapter needing to hand back a raw `Stream` object for the
//! executor to poll — the adapter drives the underlying transport to completion itself
//! (spec §4.1.6: "honor cancellation at every chunk boundary" is enforced inside that
//! drive loop, via `tokio::select!` against the turn's cancellation token).

pub mod local;
pub mod remote;

use crate::types::ToolInvocation;

pub use local::{LocalChatAdapter, LocalModelTransport};
pub use remote::{CompressionInfo, CompressionService, CompressionStatus, RemoteChatAdapter, RemoteModelTransport};

/// One chunk of a model stream, as produced by a transport.
#[derive(Debug, Clone)]
pub enum ModelStreamEvent {
    /// A delta of plain text (local path) or the remote API's normal text content.
    TextDelta(String),
    /// A provider-marked "thought" segment (remote path only; local models that don't
    /// separate thoughts from text never emit this).
    ThoughtDelta(String),
    /// A natively-returned structured tool call (remote path only).
    ToolCall(ToolInvocation),
    /// The stream has ended.
    Finished { finish_reason: Option<String> },
}

/// The accumulated result of driving one model turn to completion (or cancellation).
#[derive(Debug, Clone, Default)]
pub struct ModelTurnResult {
    /// Native tool calls (remote), always empty for the local path — the executor parses
    /// `text` with [`crate::tool_parser`] instead.
    pub invocations: Vec<ToolInvocation>,
    pub text: String,
    pub finish_reason: Option<String>,
    /// True if the turn's cancellation token fired before the stream completed.
    pub cancelled: bool,
}

/// The per-agent chat session. Wraps exactly one of the two adapters; which one is chosen
/// once, from the agent definition's model configuration, at `Executor::new`.
pub enum ChatAdapter {
    Remote(RemoteChatAdapter),
    Local(LocalChatAdapter),
}

impl ChatAdapter {
    /// True for the remote adapter: the provider returns structured function-call parts
    /// natively, so the executor skips [`crate::tool_parser`] entirely for this path.
    pub fn supports_native_tool_calls(&self) -> bool {
        matches!(self, ChatAdapter::Remote(_))
    }
}
