//! End-to-end scenarios driving `Executor::run` against scripted transports and a real
//! (in-memory) tool registry — no network, no local model server.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use subagent_exec::boundary;
use subagent_exec::executor::SoftInterruptProvider;
use subagent_exec::interrupt;
use subagent_exec::prelude::*;

use common::{remote_definition, serial, shell_tool_registry, ScriptedRemoteTransport, ScriptedTurn};

#[tokio::test]
async fn happy_path_no_output_schema_reaches_goal_in_one_turn() {
    let _guard = serial();
    let transport = ScriptedRemoteTransport::new(vec![ScriptedTurn::ToolCall {
        name: "complete_task",
        arguments: serde_json::json!({}),
    }]);
    let definition = remote_definition(None).build().unwrap();
    let host = HostContext::new(shell_tool_registry());
    let chat = ChatAdapter::Remote(RemoteChatAdapter::new(transport));
    let (sink, _rx) = activity::channel();
    let mut executor = Executor::new(definition, host, chat, sink, None).unwrap();

    let outcome = executor.run(HashMap::new(), CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.termination_reason, TerminationReason::Goal);
    assert_eq!(outcome.result, "Task completed.");
}

#[tokio::test]
async fn happy_path_structured_output_is_rendered_in_result() {
    let _guard = serial();
    let output = OutputSpec::new("Response", serde_json::json!({"type": "string"}));
    let transport = ScriptedRemoteTransport::new(vec![ScriptedTurn::ToolCall {
        name: "complete_task",
        arguments: serde_json::json!({"Response": "the sky is blue"}),
    }]);
    let definition = remote_definition(Some(output)).build().unwrap();
    let host = HostContext::new(shell_tool_registry());
    let chat = ChatAdapter::Remote(RemoteChatAdapter::new(transport));
    let (sink, _rx) = activity::channel();
    let mut executor = Executor::new(definition, host, chat, sink, None).unwrap();

    let outcome = executor.run(HashMap::new(), CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.termination_reason, TerminationReason::Goal);
    assert!(outcome.result.contains("the sky is blue"));
}

#[tokio::test]
async fn validation_failure_is_recovered_by_a_later_turn() {
    let _guard = serial();
    let output = OutputSpec::new("Response", serde_json::json!({"type": "string"}));
    let transport = ScriptedRemoteTransport::new(vec![
        // Missing the required "Response" field: accept_completion rejects it, the turn
        // continues rather than ending the run.
        ScriptedTurn::ToolCall { name: "complete_task", arguments: serde_json::json!({}) },
        ScriptedTurn::ToolCall {
            name: "complete_task",
            arguments: serde_json::json!({"Response": "recovered"}),
        },
    ]);
    let definition = remote_definition(Some(output)).build().unwrap();
    let host = HostContext::new(shell_tool_registry());
    let chat = ChatAdapter::Remote(RemoteChatAdapter::new(transport));
    let (sink, _rx) = activity::channel();
    let mut executor = Executor::new(definition, host, chat, sink, None).unwrap();

    let outcome = executor.run(HashMap::new(), CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.termination_reason, TerminationReason::Goal);
    assert!(outcome.result.contains("recovered"));
}

#[tokio::test]
async fn max_turns_is_recovered_by_the_grace_turn() {
    let _guard = serial();
    let transport = ScriptedRemoteTransport::new(vec![
        ScriptedTurn::ToolCall { name: "shell", arguments: serde_json::json!({"command": "ls"}) },
        ScriptedTurn::ToolCall { name: "complete_task", arguments: serde_json::json!({}) },
    ]);
    let definition = remote_definition(None).max_turns(1).build().unwrap();
    let host = HostContext::new(shell_tool_registry());
    let chat = ChatAdapter::Remote(RemoteChatAdapter::new(transport));
    let (sink, _rx) = activity::channel();
    let mut executor = Executor::new(definition, host, chat, sink, None).unwrap();

    let outcome = executor.run(HashMap::new(), CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.termination_reason, TerminationReason::Goal);
}

#[tokio::test]
async fn timeout_with_no_recovery_call_stays_timed_out() {
    let _guard = serial();
    let transport = ScriptedRemoteTransport::new(vec![
        ScriptedTurn::ToolCall { name: "shell", arguments: serde_json::json!({"command": "ls"}) },
        ScriptedTurn::Text("still thinking, no tool call here".into()),
    ]);
    let definition = remote_definition(None).max_time_minutes(1e-9).build().unwrap();
    let host = HostContext::new(shell_tool_registry());
    let chat = ChatAdapter::Remote(RemoteChatAdapter::new(transport));
    let (sink, _rx) = activity::channel();
    let mut executor = Executor::new(definition, host, chat, sink, None).unwrap();

    let outcome = executor.run(HashMap::new(), CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.termination_reason, TerminationReason::Timeout);
}

#[tokio::test]
async fn soft_interrupt_resumes_with_operator_text_and_reaches_goal() {
    let _guard = serial();
    let transport = ScriptedRemoteTransport::new(vec![
        ScriptedTurn::Pending,
        ScriptedTurn::ToolCall { name: "complete_task", arguments: serde_json::json!({}) },
    ]);
    let definition = remote_definition(None).build().unwrap();

    let (resolver_tx, mut resolver_rx) = tokio::sync::mpsc::unbounded_channel();
    let provider: SoftInterruptProvider = std::sync::Arc::new(move || {
        let (resolver, rendezvous) = boundary::soft_interrupt_channel();
        let _ = resolver_tx.send(resolver);
        rendezvous
    });
    let host = HostContext::new(shell_tool_registry()).with_soft_interrupt_provider(provider);
    let chat = ChatAdapter::Remote(RemoteChatAdapter::new(transport));
    let (sink, _rx) = activity::channel();
    let mut executor = Executor::new(definition, host, chat, sink, None).unwrap();

    let handle = tokio::spawn(async move { executor.run(HashMap::new(), CancellationToken::new()).await });

    // Give the run a moment to reach the pending turn and install its turn controller.
    tokio::time::sleep(Duration::from_millis(50)).await;
    interrupt::abort_current();

    let resolver = resolver_rx.recv().await.expect("soft-interrupt provider should have been invoked");
    resolver.resolve(Some("please finish now".to_string()));

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.termination_reason, TerminationReason::Goal);
}
