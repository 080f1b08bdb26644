//! # Local Chat Adapter (C4)
//!
//! Orchestrates a local (text-only, no native function calling) model: the system prompt
//! and any per-turn reminder text are injected into a wire-only view of the history that is
//! never persisted back, and the transport's cumulative-text stream is collapsed into a
//! single final string the executor hands to [`crate::tool_parser::parse_tool_calls`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::chat::ModelTurnResult;
use crate::context;
use crate::error::Result;
use crate::types::{MessagePart, MessageRole, TurnMessage};

/// Token budget at which the adapter truncates its own persisted history. Local models
/// generally carry a much smaller context window than hosted ones, and there is no host
/// compression service to delegate to on this path (spec §4.3/§6), so the adapter manages
/// its own buffer with [`context::truncate_messages`].
const LOCAL_CONTEXT_TOKEN_LIMIT: usize = 6_000;

/// How many of the most recent history entries survive a truncation, plus the oldest one
/// (typically the initial query) when `preserve_first` is honored.
const HISTORY_KEEP_TURNS: usize = 12;

/// The narrow streaming interface a local (self-hosted) model server implements. Each item
/// produced is the *cumulative* text generated so far, not a delta — this matches how most
/// local inference servers report generation progress and spares this adapter from having
/// to reassemble deltas itself.
#[async_trait]
pub trait LocalModelTransport: Send + Sync {
    async fn stream_completion(
        &self,
        wire_messages: &[TurnMessage],
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<String>>>;
}

/// Local chat session: a persisted history plus the system prompt/reminder text that are
/// only ever added to the wire view, never to `self.history`.
pub struct LocalChatAdapter {
    transport: Arc<dyn LocalModelTransport>,
    history: Vec<TurnMessage>,
}

impl LocalChatAdapter {
    pub fn new(transport: Arc<dyn LocalModelTransport>) -> Self {
        Self {
            transport,
            history: Vec::new(),
        }
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

    /// Build the wire-only view: a leading system message, then the persisted history, with
    /// `reminder` (if any) appended to the last user message's text. Spec §4.4 step 2.
    fn build_wire_messages(&self, system_prompt: &str, reminder: Option<&str>) -> Vec<TurnMessage> {
        let mut wire = Vec::with_capacity(self.history.len() + 1);
        wire.push(TurnMessage {
            role: MessageRole::System,
            parts: vec![MessagePart::Text(system_prompt.to_string())],
        });
        wire.extend(self.history.iter().cloned());

        if let Some(reminder) = reminder {
            if let Some(last_user) = wire.iter_mut().rev().find(|m| m.role == MessageRole::User) {
                last_user.parts.push(MessagePart::Text(reminder.to_string()));
            }
        }
        wire
    }

    /// Append `message` to the persisted history, then drive the transport's cumulative-text
    /// stream to completion, invoking `on_chunk` with each incremental delta (computed from
    /// the cumulative strings) so the executor can emit real-time activity. On completion the
    /// final text is persisted as a `Model` message.
    pub async fn send_message_stream(
        &mut self,
        message: TurnMessage,
        system_prompt: &str,
        reminder: Option<&str>,
        cancel: CancellationToken,
        mut on_chunk: impl FnMut(&str),
    ) -> Result<ModelTurnResult> {
        self.history.push(message);
        if context::is_approaching_limit(&self.history, LOCAL_CONTEXT_TOKEN_LIMIT) {
            log::debug!("local chat adapter: history approaching {LOCAL_CONTEXT_TOKEN_LIMIT} tokens, truncating");
            self.history = context::truncate_messages(std::mem::take(&mut self.history), HISTORY_KEEP_TURNS, true);
        }
        let wire = self.build_wire_messages(system_prompt, reminder);

        let transport = &self.transport;
        let mut stream = crate::retry::retry(crate::retry::RetryPolicy::default(), || {
            transport.stream_completion(&wire, cancel.clone())
        })
        .await?;
        let mut result = ModelTurnResult::default();
        let mut previous_len = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    result.cancelled = true;
                    break;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(cumulative)) => {
                            let delta = &cumulative[previous_len.min(cumulative.len())..];
                            if !delta.is_empty() {
                                on_chunk(delta);
                            }
                            previous_len = cumulative.len();
                            result.text = cumulative;
                        }
                        Some(Err(e)) => return Err(e),
                        None => break,
                    }
                }
            }
        }

        if !result.cancelled && !result.text.is_empty() {
            self.history.push(TurnMessage {
                role: MessageRole::Model,
                parts: vec![MessagePart::Text(result.text.clone())],
            });
        }

        Ok(result)
    }

    /// A one-shot completion outside the persisted history — used by
    /// [`crate::summarizer::summarize`], which needs a single system-prompt/user-text
    /// exchange with no bearing on the agent's own turn history.
    pub async fn complete_once(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let wire = vec![
            TurnMessage {
                role: MessageRole::System,
                parts: vec![MessagePart::Text(system_prompt.to_string())],
            },
            TurnMessage::user_text(user_text),
        ];
        let cancel = CancellationToken::new();
        let mut stream = self.transport.stream_completion(&wire, cancel).await?;
        let mut last = String::new();
        while let Some(item) = stream.next().await {
            last = item?;
        }
        Ok(last)
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        struct EchoTransport;

        #[async_trait]
        impl LocalModelTransport for EchoTransport {
            async fn stream_completion(
                &self,
                wire_messages: &[TurnMessage],
                _cancel: CancellationToken,
            ) -> Result<BoxStream<'static, Result<String>>> {
                let last_text = wire_messages.last().map(|m| m.text()).unwrap_or_default();
                Ok(futures::stream::iter(vec![Ok(format!("summary: {last_text}"))]).boxed())
            }
        }

        Self::new(Arc::new(EchoTransport))
    }
}
