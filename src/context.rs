//! # Context Window Bookkeeping
//!
//! Manual token estimation and history truncation, kept from the teacher's `context`
//! module. The local chat adapter (`crate::chat::local`) uses this to decide when to trim
//! its own history buffer before a send — the concrete mechanism behind the "opaque
//! chat-compression service" contract (spec §4.3/§6) on the local-model path, where there
//! is no host-provided compression RPC to delegate to.

use crate::types::TurnMessage;

/// Approximate characters per token across model families (70-85% accurate; see teacher's
/// doc comment on the same constant).
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a message history using a character-based approximation.
pub fn estimate_tokens(messages: &[TurnMessage]) -> usize {
    let chars: usize = messages.iter().map(|m| m.text().chars().count()).sum();
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// True if `messages` is estimated to be at or past `limit` tokens.
pub fn is_approaching_limit(messages: &[TurnMessage], limit: usize) -> bool {
    estimate_tokens(messages) >= limit
}

/// Truncate history to the most recent `keep_turns` turns (a "turn" here is one message).
/// When `preserve_first` is true, the oldest message (typically a system/seed message) is
/// kept regardless of `keep_turns`.
pub fn truncate_messages(messages: Vec<TurnMessage>, keep_turns: usize, preserve_first: bool) -> Vec<TurnMessage> {
    if messages.len() <= keep_turns {
        return messages;
    }

    if preserve_first && !messages.is_empty() {
        let first = messages[0].clone();
        let tail_start = messages.len().saturating_sub(keep_turns.saturating_sub(1).max(1));
        let mut out = Vec::with_capacity(keep_turns);
        out.push(first);
        out.extend(messages[tail_start.max(1)..].iter().cloned());
        out
    } else {
        let tail_start = messages.len() - keep_turns;
        messages[tail_start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;

    #[test]
    fn estimates_tokens_from_char_count() {
        let messages = vec![TurnMessage::user_text("a".repeat(40))];
        assert_eq!(estimate_tokens(&messages), 10);
    }

    #[test]
    fn detects_approaching_limit() {
        let messages = vec![TurnMessage::user_text("a".repeat(400))];
        assert!(is_approaching_limit(&messages, 100));
        assert!(!is_approaching_limit(&messages, 1000));
    }

    #[test]
    fn truncate_keeps_recent_turns() {
        let messages: Vec<_> = (0..10).map(|i| TurnMessage::user_text(format!("turn {i}"))).collect();
        let truncated = truncate_messages(messages, 3, false);
        assert_eq!(truncated.len(), 3);
        assert_eq!(truncated[0].text(), "turn 7");
        assert_eq!(truncated[2].text(), "turn 9");
    }

    #[test]
    fn truncate_preserves_first_when_requested() {
        let messages: Vec<_> = (0..10).map(|i| TurnMessage::user_text(format!("turn {i}"))).collect();
        let truncated = truncate_messages(messages, 3, true);
        assert_eq!(truncated[0].text(), "turn 0");
        assert_eq!(truncated.last().unwrap().text(), "turn 9");
    }

    #[test]
    fn truncate_is_noop_below_limit() {
        let messages = vec![TurnMessage::new(MessageRole::User, vec![]).unwrap()];
        let truncated = truncate_messages(messages.clone(), 10, false);
        assert_eq!(truncated.len(), messages.len());
    }
}
