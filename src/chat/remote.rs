//! # Remote Chat Adapter (C3)
//!
//! Thin orchestration over an injected [`RemoteModelTransport`]: maintains the turn
//! history, optionally compresses it before each turn via a [`CompressionService`], and
//! drives the transport's event stream to completion, accumulating native tool calls and
//! text into one [`ModelTurnResult`].
//!
//! The transport itself — the actual HTTP/SSE call to a hosted model API — is out of scope
//! here by design: this adapter only consumes the narrow streaming interface spec §1 grants
//! it, so it can be exercised against a mock transport without a network.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::ModelStreamEvent;
use crate::chat::ModelTurnResult;
use crate::error::Result;
use crate::tools::FunctionDeclaration;
use crate::types::{MessagePart, MessageRole, TurnMessage};

/// The narrow streaming interface a remote model provider implements. Everything about
/// authentication, request shaping, and wire parsing lives on the other side of this trait.
#[async_trait]
pub trait RemoteModelTransport: Send + Sync {
    async fn send_message_stream(
        &self,
        history: &[TurnMessage],
        tool_schemas: &[FunctionDeclaration],
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<ModelStreamEvent>>>;
}

/// Whether a compression attempt at the start of a turn changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStatus {
    /// History was replaced with a compressed version.
    Compressed,
    /// Compression ran but produced a history no smaller than before — the caller should not
    /// retry compression again this turn (spec §4.2: avoid a compress-loop).
    CompressionFailedInflatedTokenCount,
    /// No compression was attempted (history was within budget).
    None,
}

/// The result of one compression attempt.
#[derive(Debug, Clone)]
pub struct CompressionInfo {
    pub new_history: Option<Vec<TurnMessage>>,
    pub status: CompressionStatus,
}

/// A host-supplied service that can compact a turn history when it approaches the model's
/// context window (spec §4.2). Kept behind a trait for the same reason as the transport:
/// the actual summarization strategy is a host concern, not this crate's.
#[async_trait]
pub trait CompressionService: Send + Sync {
    async fn maybe_compress(&self, history: &[TurnMessage], previous_attempt_inflated: bool) -> Result<CompressionInfo>;
}

/// Remote chat session: history plus an injected transport and optional compression service.
pub struct RemoteChatAdapter {
    transport: Arc<dyn RemoteModelTransport>,
    compression: Option<Arc<dyn CompressionService>>,
    history: Vec<TurnMessage>,
}

impl RemoteChatAdapter {
    pub fn new(transport: Arc<dyn RemoteModelTransport>) -> Self {
        Self {
            transport,
            compression: None,
            history: Vec::new(),
        }
    }

    pub fn with_compression(mut self, compression: Arc<dyn CompressionService>) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn history(&self) -> &[TurnMessage] {
        &self.history
    }

    /// Append messages straight to the persisted history, ahead of the first turn
    /// (spec §4.1.5: an agent's `initial_messages` is a legitimate alternative to a
    /// system-prompt template).
    pub fn seed_history(&mut self, messages: Vec<TurnMessage>) {
        self.history.extend(messages);
    }

    /// Run compression if a service is configured. `previous_attempt_inflated` should be
    /// true iff the last call to this method returned
    /// `CompressionStatus::CompressionFailedInflatedTokenCount`, so the service can decide
    /// whether to try a different strategy or give up.
    pub async fn maybe_compress(&mut self, previous_attempt_inflated: bool) -> Result<CompressionStatus> {
        let Some(service) = &self.compression else {
            return Ok(CompressionStatus::None);
        };
        let outcome = service.maybe_compress(&self.history, previous_attempt_inflated).await?;
        if let Some(new_history) = outcome.new_history {
            self.history = new_history;
        }
        Ok(outcome.status)
    }

    /// Append `message`, then drive the transport stream to completion, invoking `on_chunk`
    /// for each event as it arrives. Honors `cancel` at every chunk boundary (spec §4.1.6).
    pub async fn send_message_stream(
        &mut self,
        message: TurnMessage,
        tool_schemas: &[FunctionDeclaration],
        cancel: CancellationToken,
        mut on_chunk: impl FnMut(&ModelStreamEvent),
    ) -> Result<ModelTurnResult> {
        self.history.push(message);

        let transport = &self.transport;
        let history = &self.history;
        let mut stream = crate::retry::retry(crate::retry::RetryPolicy::default(), || {
            transport.send_message_stream(history, tool_schemas, cancel.clone())
        })
        .await?;
        let mut result = ModelTurnResult::default();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    result.cancelled = true;
                    break;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(event)) => {
                            on_chunk(&event);
                            match event {
                                ModelStreamEvent::TextDelta(text) => result.text.push_str(&text),
                                ModelStreamEvent::ThoughtDelta(_) => {}
                                ModelStreamEvent::ToolCall(invocation) => result.invocations.push(invocation),
                                ModelStreamEvent::Finished { finish_reason } => {
                                    result.finish_reason = finish_reason;
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => return Err(e),
                        None => break,
                    }
                }
            }
        }

        if !result.cancelled {
            let mut parts = Vec::new();
            if !result.text.is_empty() {
                parts.push(MessagePart::Text(result.text.clone()));
            }
            for invocation in &result.invocations {
                parts.push(MessagePart::ToolInvocation(invocation.clone()));
            }
            if !parts.is_empty() {
                self.history.push(TurnMessage { role: MessageRole::Model, parts });
            }
        }

        Ok(result)
    }
}
