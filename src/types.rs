//! # Core Turn Data Model
//!
//! Defines the wire-level shapes exchanged between the [`crate::executor::Executor`] and a
//! chat backend: [`TurnMessage`], [`ToolInvocation`], [`ToolResponse`], plus the run-level
//! [`TerminationReason`] and [`RunOutcome`].
//!
//! These are intentionally provider-agnostic — neither OpenAI's nor any other vendor's
//! wire format leaks past [`crate::chat`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// MESSAGE ROLE
// ============================================================================

/// Role of a turn message's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    /// A message supplied to the model: either the original user input, aggregated tool
    /// responses from the previous turn, or operator-supplied redirection text.
    User,
    /// A message produced by the model: text and/or tool invocations.
    Model,
    /// A system instruction. Only ever used on the wire by the local chat adapter (spec
    /// §4.4); never appears in an agent's persisted [`TurnMessage`] history.
    System,
}

// ============================================================================
// TOOL INVOCATION / RESPONSE
// ============================================================================

/// A single tool call the model asked the executor to perform.
///
/// `call_id` is stable within a turn: `{prompt_id}-{index}` unless the provider supplied
/// its own id natively (see spec §6, Identifier format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// True if this invocation is the synthetic completion tool.
    pub fn is_complete_task(&self) -> bool {
        self.name == crate::executor::COMPLETE_TASK_TOOL
    }
}

/// The outcome of executing one [`ToolInvocation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolOutcome {
    /// The tool ran successfully. `content` is what goes back to the model; `display` is a
    /// short human-readable surrogate the UI may render instead of the raw content.
    Success { content: Value, display: String },
    /// The tool failed, was rejected, or was never dispatched (e.g. unauthorized).
    Error(String),
}

/// The response to one [`ToolInvocation`], carried back to the model in the next user
/// message. Spec invariant: exactly one response per invocation, same order as invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub call_id: String,
    pub name: String,
    pub outcome: ToolOutcome,
}

impl ToolResponse {
    pub fn success(call_id: impl Into<String>, name: impl Into<String>, content: Value, display: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            outcome: ToolOutcome::Success {
                content,
                display: display.into(),
            },
        }
    }

    pub fn error(call_id: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            outcome: ToolOutcome::Error(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }
}

// ============================================================================
// MESSAGE PARTS
// ============================================================================

/// One part of a [`TurnMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePart {
    Text(String),
    ToolInvocation(ToolInvocation),
    ToolResponse(ToolResponse),
}

/// One role + ordered parts exchange. Invariant: a single message never mixes
/// [`MessagePart::ToolInvocation`] and [`MessagePart::ToolResponse`] parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

impl TurnMessage {
    /// Construct a message, rejecting the one invariant violation the spec calls out:
    /// mixing tool invocations and tool responses in the same message.
    pub fn new(role: MessageRole, parts: Vec<MessagePart>) -> Result<Self> {
        let has_invocation = parts.iter().any(|p| matches!(p, MessagePart::ToolInvocation(_)));
        let has_response = parts.iter().any(|p| matches!(p, MessagePart::ToolResponse(_)));
        if has_invocation && has_response {
            return Err(Error::invalid_input(
                "a turn message cannot mix tool invocations and tool responses",
            ));
        }
        Ok(Self { role, parts })
    }

    /// A plain user text message (the common case: initial query, operator redirection).
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![MessagePart::Text(text.into())],
        }
    }

    /// A user message aggregating tool responses, in invocation order, for the next turn.
    pub fn tool_responses(responses: Vec<ToolResponse>) -> Self {
        Self {
            role: MessageRole::User,
            parts: responses.into_iter().map(MessagePart::ToolResponse).collect(),
        }
    }

    /// All tool invocations in this message, in declared order.
    pub fn tool_invocations(&self) -> Vec<&ToolInvocation> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::ToolInvocation(inv) => Some(inv),
                _ => None,
            })
            .collect()
    }

    /// The concatenation of every text part, joined with newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// RUN OUTCOME
// ============================================================================

/// Why a run ended. Mirrors spec §7's small enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// `complete_task` was accepted (directly, or after a successful recovery turn).
    Goal,
    /// `max_turns` was reached and the recovery turn did not recover.
    MaxTurns,
    /// The wall-clock timer elapsed and the recovery turn did not recover.
    Timeout,
    /// A model turn produced zero tool calls and the recovery turn did not recover.
    ErrorNoCompleteTaskCall,
    /// The operator issued a hard interrupt.
    Aborted,
    /// Any other unrecovered error.
    Error,
}

/// The result of a completed [`crate::executor::Executor::run`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub result: String,
    pub termination_reason: TerminationReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mixed_invocation_and_response() {
        let parts = vec![
            MessagePart::ToolInvocation(ToolInvocation::new("c-1", "shell", Map::new())),
            MessagePart::ToolResponse(ToolResponse::error("c-0", "shell", "boom")),
        ];
        let result = TurnMessage::new(MessageRole::User, parts);
        assert!(result.is_err());
    }

    #[test]
    fn allows_text_alongside_invocations() {
        let parts = vec![
            MessagePart::Text("let me check".into()),
            MessagePart::ToolInvocation(ToolInvocation::new("c-1", "shell", Map::new())),
        ];
        assert!(TurnMessage::new(MessageRole::Model, parts).is_ok());
    }

    #[test]
    fn tool_responses_preserve_order() {
        let responses = vec![
            ToolResponse::success("c-0", "a", Value::Null, "ok"),
            ToolResponse::error("c-1", "b", "nope"),
        ];
        let msg = TurnMessage::tool_responses(responses);
        assert_eq!(msg.parts.len(), 2);
        match &msg.parts[1] {
            MessagePart::ToolResponse(r) => assert_eq!(r.call_id, "c-1"),
            _ => panic!("expected tool response"),
        }
    }

    #[test]
    fn text_joins_with_newline() {
        let msg = TurnMessage::new(
            MessageRole::Model,
            vec![MessagePart::Text("a".into()), MessagePart::Text("b".into())],
        )
        .unwrap();
        assert_eq!(msg.text(), "a\nb");
    }
}
