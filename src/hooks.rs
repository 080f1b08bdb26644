//! # Lifecycle Hooks
//!
//! Kept from the teacher's `hooks` module shape: a small set of lifecycle events a host can
//! intercept to gate, audit, or rewrite execution. Wired into the executor's tool-dispatch
//! step (spec §4.1.4) as additive instrumentation — hooks never change the spec-mandated
//! tool-response ordering or count invariants, they only run around each step.

use serde_json::Value;

use crate::types::{ToolResponse, TurnMessage};

pub const HOOK_PRE_TOOL_USE: &str = "PreToolUse";
pub const HOOK_POST_TOOL_USE: &str = "PostToolUse";
pub const HOOK_USER_PROMPT_SUBMIT: &str = "UserPromptSubmit";

/// What a hook wants to happen next.
#[derive(Debug, Clone, Default)]
pub enum HookDecision {
    /// Proceed unmodified.
    #[default]
    Continue,
    /// Block the operation; carries a reason surfaced back to the model as a tool error
    /// (for `PreToolUse`) or dropped with a log line (for the other events).
    Block(String),
    /// Proceed, but with modified arguments (`PreToolUse`) or modified prompt text
    /// (`UserPromptSubmit`).
    Modify(Value),
}

/// Event data passed to `PreToolUse` hooks before tool execution.
pub struct PreToolUseEvent<'a> {
    pub tool_name: &'a str,
    pub call_id: &'a str,
    pub arguments: &'a Value,
    pub history: &'a [TurnMessage],
}

/// Event data passed to `PostToolUse` hooks after tool execution.
pub struct PostToolUseEvent<'a> {
    pub tool_name: &'a str,
    pub call_id: &'a str,
    pub arguments: &'a Value,
    pub response: &'a ToolResponse,
    pub history: &'a [TurnMessage],
}

/// Event data passed to `UserPromptSubmit` hooks before a prompt is sent to the model.
pub struct UserPromptSubmitEvent<'a> {
    pub prompt: &'a str,
    pub history: &'a [TurnMessage],
}

type PreToolUseHook = Box<dyn Fn(&PreToolUseEvent) -> HookDecision + Send + Sync>;
type PostToolUseHook = Box<dyn Fn(&PostToolUseEvent) -> HookDecision + Send + Sync>;
type UserPromptSubmitHook = Box<dyn Fn(&UserPromptSubmitEvent) -> HookDecision + Send + Sync>;

/// Container for registering and running lifecycle hooks. Hooks of a given kind run in
/// registration order; the first non-`Continue` decision wins and short-circuits the rest.
#[derive(Default)]
pub struct Hooks {
    pre_tool_use: Vec<PreToolUseHook>,
    post_tool_use: Vec<PostToolUseHook>,
    user_prompt_submit: Vec<UserPromptSubmitHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pre_tool_use(
        &mut self,
        hook: impl Fn(&PreToolUseEvent) -> HookDecision + Send + Sync + 'static,
    ) -> &mut Self {
        self.pre_tool_use.push(Box::new(hook));
        self
    }

    pub fn on_post_tool_use(
        &mut self,
        hook: impl Fn(&PostToolUseEvent) -> HookDecision + Send + Sync + 'static,
    ) -> &mut Self {
        self.post_tool_use.push(Box::new(hook));
        self
    }

    pub fn on_user_prompt_submit(
        &mut self,
        hook: impl Fn(&UserPromptSubmitEvent) -> HookDecision + Send + Sync + 'static,
    ) -> &mut Self {
        self.user_prompt_submit.push(Box::new(hook));
        self
    }

    pub fn run_pre_tool_use(&self, event: &PreToolUseEvent) -> HookDecision {
        for hook in &self.pre_tool_use {
            match hook(event) {
                HookDecision::Continue => continue,
                decision => return decision,
            }
        }
        HookDecision::Continue
    }

    pub fn run_post_tool_use(&self, event: &PostToolUseEvent) -> HookDecision {
        for hook in &self.post_tool_use {
            match hook(event) {
                HookDecision::Continue => continue,
                decision => return decision,
            }
        }
        HookDecision::Continue
    }

    pub fn run_user_prompt_submit(&self, event: &UserPromptSubmitEvent) -> HookDecision {
        for hook in &self.user_prompt_submit {
            match hook(event) {
                HookDecision::Continue => continue,
                decision => return decision,
            }
        }
        HookDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_hooks_means_continue() {
        let hooks = Hooks::new();
        let event = PreToolUseEvent {
            tool_name: "shell",
            call_id: "c-0",
            arguments: &Value::Null,
            history: &[],
        };
        assert!(matches!(hooks.run_pre_tool_use(&event), HookDecision::Continue));
    }

    #[test]
    fn first_blocking_hook_short_circuits() {
        let mut hooks = Hooks::new();
        hooks.on_pre_tool_use(|_| HookDecision::Block("no shell allowed".into()));
        hooks.on_pre_tool_use(|_| panic!("should never run"));

        let event = PreToolUseEvent {
            tool_name: "shell",
            call_id: "c-0",
            arguments: &Value::Null,
            history: &[],
        };
        match hooks.run_pre_tool_use(&event) {
            HookDecision::Block(reason) => assert_eq!(reason, "no shell allowed"),
            _ => panic!("expected block"),
        }
    }

    #[test]
    fn modify_decision_carries_payload() {
        let mut hooks = Hooks::new();
        hooks.on_pre_tool_use(|_| HookDecision::Modify(serde_json::json!({"command": "ls -la"})));
        let event = PreToolUseEvent {
            tool_name: "shell",
            call_id: "c-0",
            arguments: &Value::Null,
            history: &[],
        };
        match hooks.run_pre_tool_use(&event) {
            HookDecision::Modify(v) => assert_eq!(v["command"], "ls -la"),
            _ => panic!("expected modify"),
        }
    }
}
