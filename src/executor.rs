//! # Executor (C8, the heart)
//!
//! The agent main loop: turn state machine, completion-tool semantics, output validation,
//! activity emission, and the recovery turn. Built fresh (no single teacher file implements
//! a loop this shape), following the teacher's conventions throughout: validate-at-
//! construction, `thiserror`-based recoverable-vs-terminal error handling, `log` at
//! `debug`/`info`, and a builder-free `new`/`run` split mirroring the teacher's
//! `Client::new`/`Client::query` split.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::activity::{ActivityEvent, ActivitySink};
use crate::boundary::{InvocationBoundary, SoftInterruptRendezvous};
use crate::chat::{ChatAdapter, CompressionStatus, ModelStreamEvent};
use crate::definition::AgentDefinition;
use crate::error::{Error, Result};
use crate::hooks::{Hooks, HookDecision, PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent};
use crate::interrupt::{self, InterruptKind};
use crate::tool_parser;
use crate::tools::{FilteredToolRegistry, FunctionDeclaration, OutputChunkCallback, ToolRegistry};
use crate::types::{
    MessagePart, MessageRole, RunOutcome, TerminationReason, ToolInvocation, ToolOutcome, ToolResponse, TurnMessage,
};

/// The synthetic completion tool's name. Invoking it is the only way a turn ends with
/// status "goal reached" (spec §3).
pub const COMPLETE_TASK_TOOL: &str = "complete_task";

const RECOVERY_GRACE: Duration = Duration::from_secs(60);

/// The executor's internal turn state machine (spec §4.1.2). Not exposed publicly; callers
/// only see [`run`]'s eventual `{result, termination_reason}`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TurnState {
    ReadyForTurn,
    AwaitingModel,
    ProcessingCalls(Vec<ToolInvocation>),
    AwaitingSoftInterruptInput,
    Terminating(TerminationReason),
}

/// Optional post-processor applied to a validated `complete_task` output before it becomes
/// the final result (spec §4.7). The executor never interprets its return value further.
pub type OutputPostProcessor = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Optional schema validator for `complete_task`'s output argument. Returns `Err` with the
/// human-readable validation failure on mismatch. The default is a minimal structural check
/// (see [`validate_output_schema`]); hosts with a fuller JSON-schema engine may supply their
/// own.
pub type OutputValidator = Arc<dyn Fn(&serde_json::Value, &serde_json::Value) -> std::result::Result<(), String> + Send + Sync>;

/// A host's way of handing the executor a fresh soft-interrupt rendezvous each time one is
/// needed (spec §4.10): the host keeps the paired [`crate::boundary::SoftInterruptResolver`]
/// and resolves it once the operator supplies redirection text (or drops it to abort). With
/// no provider configured, a bare run has nobody to ask and degrades to an immediate abort.
pub type SoftInterruptProvider = Arc<dyn Fn() -> SoftInterruptRendezvous + Send + Sync>;

/// Everything the executor needs from its host that isn't part of the agent definition
/// itself: the tool registry to resolve against, an optional environment-context block, and
/// the optional knobs from §4.6/§4.7.
pub struct HostContext {
    pub tool_registry: Arc<dyn ToolRegistry>,
    pub environment_context: Option<String>,
    pub output_post_processor: Option<OutputPostProcessor>,
    pub output_validator: Option<OutputValidator>,
    pub soft_interrupt_provider: Option<SoftInterruptProvider>,
}

impl HostContext {
    pub fn new(tool_registry: Arc<dyn ToolRegistry>) -> Self {
        Self {
            tool_registry,
            environment_context: None,
            output_post_processor: None,
            output_validator: None,
            soft_interrupt_provider: None,
        }
    }

    pub fn with_environment_context(mut self, text: impl Into<String>) -> Self {
        self.environment_context = Some(text.into());
        self
    }

    pub fn with_output_post_processor(mut self, f: OutputPostProcessor) -> Self {
        self.output_post_processor = Some(f);
        self
    }

    pub fn with_output_validator(mut self, f: OutputValidator) -> Self {
        self.output_validator = Some(f);
        self
    }

    pub fn with_soft_interrupt_provider(mut self, f: SoftInterruptProvider) -> Self {
        self.soft_interrupt_provider = Some(f);
        self
    }
}

/// Telemetry the executor reports out-of-band from the activity stream (spec §6).
#[derive(Debug, Clone)]
pub enum TelemetryRecord {
    AgentStart { agent_id: String },
    AgentFinish { agent_id: String, name: String, elapsed_ms: u128, turn_count: u32, reason: TerminationReason },
    RecoveryAttempt { reason: TerminationReason, elapsed_ms: u128, success: bool, turn_count: u32 },
}

pub type TelemetrySink = Arc<dyn Fn(TelemetryRecord) + Send + Sync>;

/// Runs one [`AgentDefinition`] to completion. Built with [`Executor::new`], which resolves
/// and allow-list-checks the agent's tools once (spec §4.1.1); run with [`Executor::run`].
pub struct Executor {
    agent_id: String,
    definition: AgentDefinition,
    registry: FilteredToolRegistry,
    chat: ChatAdapter,
    activity: ActivitySink,
    hooks: Hooks,
    host: HostContext,
    telemetry: Option<TelemetrySink>,
    parent_prefix: String,
}

impl Executor {
    /// Build an executor for `definition`. Resolves `definition.tools` against
    /// `host.tool_registry`, rejecting any tool not on the non-interactive allow-list with
    /// `Error::Configuration` (spec §4.1.1, §7).
    pub fn new(
        definition: AgentDefinition,
        host: HostContext,
        chat: ChatAdapter,
        activity: ActivitySink,
        parent_agent_id: Option<&str>,
    ) -> Result<Self> {
        let registry = FilteredToolRegistry::build(host.tool_registry.clone(), &definition.tools)?;
        let parent_prefix = parent_agent_id.map(|p| format!("{p}/")).unwrap_or_default();
        let agent_id = format!("{parent_prefix}{}-{}", definition.name, random_suffix());

        Ok(Self {
            agent_id,
            definition,
            registry,
            chat,
            activity,
            hooks: Hooks::new(),
            host,
            telemetry: None,
            parent_prefix,
        })
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_telemetry(mut self, sink: TelemetrySink) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Run the agent to completion. `inputs` feeds the query template (spec §4.1.2's initial
    /// state); `external_cancel` is combined (logical OR, via child tokens) with the turn
    /// controller the Interrupt Manager installs per turn (spec §5).
    pub async fn run(
        &mut self,
        inputs: HashMap<String, String>,
        external_cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let boundary = InvocationBoundary::enter()?;
        let run_start = Instant::now();
        if let Some(telemetry) = &self.telemetry {
            telemetry(TelemetryRecord::AgentStart { agent_id: self.agent_id.clone() });
        }
        log::info!("executor: agent '{}' starting run", self.agent_id);

        let result = self.run_inner(inputs, external_cancel, run_start).await;
        drop(boundary);

        let (reason, turn_count) = match &result {
            Ok((_, reason, turns)) => (*reason, *turns),
            Err(_) => (TerminationReason::Error, 0),
        };
        let elapsed_ms = run_start.elapsed().as_millis();
        if let Some(telemetry) = &self.telemetry {
            telemetry(TelemetryRecord::AgentFinish {
                agent_id: self.agent_id.clone(),
                name: self.definition.name.clone(),
                elapsed_ms,
                turn_count,
                reason,
            });
        }
        log::info!("executor: agent '{}' finished, reason={:?}, elapsed_ms={}", self.agent_id, reason, elapsed_ms);

        result.map(|(result, termination_reason, _)| RunOutcome { result, termination_reason })
    }

    async fn run_inner(
        &mut self,
        inputs: HashMap<String, String>,
        external_cancel: CancellationToken,
        run_start: Instant,
    ) -> Result<(String, TerminationReason, u32)> {
        let system_prompt = self.assemble_system_prompt(&inputs);

        if !self.definition.prompt.initial_messages.is_empty() {
            let seed = self.definition.prompt.initial_messages.clone();
            match &mut self.chat {
                ChatAdapter::Remote(adapter) => adapter.seed_history(seed),
                ChatAdapter::Local(adapter) => adapter.seed_history(seed),
            }
        }

        let initial_query = self.definition.initial_query(&inputs);
        let mut user_message = TurnMessage::user_text(self.run_prompt_submit_hook(&initial_query));
        let mut state = TurnState::ReadyForTurn;
        let mut turn_count: u32 = 0;
        let wall_deadline = run_start + Duration::from_secs_f64(self.definition.run.max_time_minutes * 60.0);
        let mut completed_output: Option<serde_json::Value> = None;
        let mut compression_inflated = false;
        let mut current_turn_cancel = CancellationToken::new();

        loop {
            state = match state {
                TurnState::ReadyForTurn => {
                    if turn_count >= self.definition.run.max_turns {
                        TurnState::Terminating(TerminationReason::MaxTurns)
                    } else if Instant::now() >= wall_deadline {
                        TurnState::Terminating(TerminationReason::Timeout)
                    } else if external_cancel.is_cancelled() {
                        TurnState::Terminating(TerminationReason::Aborted)
                    } else {
                        TurnState::AwaitingModel
                    }
                }

                TurnState::AwaitingModel => {
                    turn_count += 1;
                    log::debug!("executor: agent '{}' turn {} awaiting model", self.agent_id, turn_count);

                    if let ChatAdapter::Remote(adapter) = &mut self.chat {
                        match adapter.maybe_compress(compression_inflated).await {
                            Ok(status) => {
                                compression_inflated = matches!(status, CompressionStatus::CompressionFailedInflatedTokenCount);
                            }
                            Err(e) => {
                                log::warn!("executor: agent '{}' compression attempt failed: {e}", self.agent_id);
                            }
                        }
                    }

                    let prompt_id = format!("{}#{turn_count}", self.agent_id);
                    let turn_cancel = CancellationToken::new();
                    interrupt::set_current_turn_controller(turn_cancel.clone());
                    let combined = turn_cancel.child_token();
                    current_turn_cancel = combined.clone();

                    let schemas = self.function_declarations();
                    let outcome = self
                        .consume_model_turn(user_message.clone(), &schemas, &prompt_id, &system_prompt, combined, external_cancel.clone())
                        .await?;

                    match outcome {
                        ModelTurnOutcome::Cancelled => {
                            if interrupt::is_current_interrupt_hard() || external_cancel.is_cancelled() {
                                TurnState::Terminating(TerminationReason::Aborted)
                            } else {
                                TurnState::AwaitingSoftInterruptInput
                            }
                        }
                        ModelTurnOutcome::Invocations(invocations) if !invocations.is_empty() => {
                            TurnState::ProcessingCalls(invocations)
                        }
                        ModelTurnOutcome::Invocations(_) => TurnState::Terminating(TerminationReason::ErrorNoCompleteTaskCall),
                    }
                }

                TurnState::AwaitingSoftInterruptInput => {
                    self.activity.emit(ActivityEvent::interrupted(&self.definition.name));
                    let rendezvous: SoftInterruptRendezvous = match &self.host.soft_interrupt_provider {
                        Some(provider) => provider(),
                        None => {
                            // Nobody configured a provider to keep the matching resolver, so
                            // there is no one who could ever call `resolve` — drop it now
                            // rather than let it sit alive and deadlock the await below.
                            let (resolver, rendezvous) = crate::boundary::soft_interrupt_channel();
                            drop(resolver);
                            rendezvous
                        }
                    };
                    match rendezvous.await_operator_text().await {
                        Some(text) => {
                            user_message = TurnMessage::user_text(self.run_prompt_submit_hook(&text));
                            TurnState::ReadyForTurn
                        }
                        None => TurnState::Terminating(TerminationReason::Aborted),
                    }
                }

                TurnState::ProcessingCalls(invocations) => {
                    let dispatch = self.dispatch_invocations(invocations, current_turn_cancel.clone()).await?;
                    match dispatch.completion_output {
                        Some(output) => {
                            completed_output = output;
                            TurnState::Terminating(TerminationReason::Goal)
                        }
                        None => {
                            user_message = TurnMessage::tool_responses(dispatch.responses);
                            TurnState::ReadyForTurn
                        }
                    }
                }

                TurnState::Terminating(reason) => {
                    let recoverable = matches!(
                        reason,
                        TerminationReason::MaxTurns | TerminationReason::Timeout | TerminationReason::ErrorNoCompleteTaskCall
                    );
                    if !recoverable {
                        return Ok((self.finalize_result(reason, completed_output.as_ref()), reason, turn_count));
                    }

                    match self.run_recovery_turn(reason, run_start, turn_count, &system_prompt).await {
                        Some(output) => {
                            return Ok((
                                self.finalize_result(TerminationReason::Goal, output.as_ref()),
                                TerminationReason::Goal,
                                turn_count,
                            ))
                        }
                        None => return Ok((self.finalize_result(reason, None), reason, turn_count)),
                    }
                }
            };
        }
    }

    // ========================================================================
    // SYSTEM PROMPT ASSEMBLY (spec §4.1.5)
    // ========================================================================

    fn assemble_system_prompt(&self, inputs: &HashMap<String, String>) -> String {
        let template = self.definition.prompt.system_prompt_template.as_deref().unwrap_or_default();
        let mut prompt = crate::definition::interpolate(template, inputs);

        if let Some(directive) = &self.definition.prompt.directive {
            prompt.push_str("\n\n");
            prompt.push_str(directive);
        }

        if prompt.contains("{tool_code}") {
            let schemas = self.function_declarations();
            let rendered = if self.chat.supports_native_tool_calls() {
                serde_json::to_string_pretty(&schemas).unwrap_or_default()
            } else {
                render_gemma_compatible_schemas(&schemas)
            };
            prompt = prompt.replace("{tool_code}", &rendered);
        }

        if let Some(env_context) = &self.host.environment_context {
            prompt.push_str("\n\n## Environment Context\n");
            prompt.push_str(env_context);
        }

        prompt.push_str(
            "\n\n## Important Rules\n\
             - You operate in non-interactive mode; never ask the user a question.\n\
             - Always use absolute paths.\n\
             - You must end every task by calling `complete_task`.\n\
             - Never call `complete_task` in the same turn as any other tool.",
        );

        prompt
    }

    /// Run the `UserPromptSubmit` hook over a freshly constructed prompt (the initial query
    /// or operator-supplied soft-interrupt continuation text). `Block` is logged and the
    /// original text passed through unmodified, matching `HookDecision::Block`'s documented
    /// behavior for events other than `PreToolUse`.
    fn run_prompt_submit_hook(&self, prompt: &str) -> String {
        let event = UserPromptSubmitEvent { prompt, history: &[] };
        match self.hooks.run_user_prompt_submit(&event) {
            HookDecision::Continue => prompt.to_string(),
            HookDecision::Modify(serde_json::Value::String(s)) => s,
            HookDecision::Modify(_) => prompt.to_string(),
            HookDecision::Block(reason) => {
                log::warn!("executor: UserPromptSubmit hook blocked prompt ({reason}), proceeding unmodified");
                prompt.to_string()
            }
        }
    }

    fn function_declarations(&self) -> Vec<FunctionDeclaration> {
        let mut names = self.registry.authorized_names();
        names.sort();
        let mut schemas = self.registry.get_function_declarations_filtered(&names);
        schemas.push(completion_tool_declaration(&self.definition));
        schemas
    }

    // ========================================================================
    // STREAMING CONSUMPTION (spec §4.1.6)
    // ========================================================================

    async fn consume_model_turn(
        &mut self,
        message: TurnMessage,
        schemas: &[FunctionDeclaration],
        prompt_id: &str,
        system_prompt: &str,
        turn_cancel: CancellationToken,
        external_cancel: CancellationToken,
    ) -> Result<ModelTurnOutcome> {
        let agent_name = self.definition.name.clone();
        let combined = turn_cancel.clone();
        let watch_external = external_cancel.clone();
        tokio::spawn(async move {
            watch_external.cancelled().await;
            combined.cancel();
        });

        let activity = self.activity.clone();
        let reminder = self.definition.prompt.reminder.clone();
        let output_present = self.definition.output.is_some();

        match &mut self.chat {
            ChatAdapter::Remote(adapter) => {
                let result = adapter
                    .send_message_stream(message, schemas, turn_cancel.clone(), |event| {
                        emit_stream_activity(&activity, &agent_name, event);
                    })
                    .await?;
                if result.cancelled {
                    return Ok(ModelTurnOutcome::Cancelled);
                }
                Ok(ModelTurnOutcome::Invocations(result.invocations))
            }
            ChatAdapter::Local(adapter) => {
                let result = adapter
                    .send_message_stream(message, system_prompt, reminder.as_deref(), turn_cancel.clone(), |delta| {
                        activity.emit(ActivityEvent::thought_chunk(&agent_name, delta));
                    })
                    .await?;
                if result.cancelled {
                    return Ok(ModelTurnOutcome::Cancelled);
                }
                let mut invocations = tool_parser::parse_tool_calls(&result.text, prompt_id);
                if invocations.is_empty() && output_present {
                    invocations.push(synthesize_fallback_completion(&result.text, prompt_id));
                }
                Ok(ModelTurnOutcome::Invocations(invocations))
            }
        }
    }

    // ========================================================================
    // TOOL DISPATCH (spec §4.1.4) + COMPLETION PROTOCOL (spec §4.1.3)
    // ========================================================================

    /// Dispatch one turn's invocations. `complete_task` calls are resolved synchronously
    /// in invocation order (they never reach the Tool Registry); every other invocation is
    /// authorized and run through its `PreToolUse` hook synchronously to decide whether it
    /// executes at all, then all surviving executions are scheduled against the Tool
    /// Registry and awaited together with `join_all` (spec §4.1.4 steps 3-4, §5). Results
    /// are written back at their original index so the response order matches the model's
    /// invocation order regardless of which execution actually finished first.
    async fn dispatch_invocations(&mut self, invocations: Vec<ToolInvocation>, cancel: CancellationToken) -> Result<DispatchOutcome> {
        let mut completion_output: Option<Option<serde_json::Value>> = None;
        let mut responses: Vec<Option<ToolResponse>> = Vec::with_capacity(invocations.len());
        let mut any_succeeded = false;
        let mut any_non_completion = false;
        let mut pending: Vec<(usize, ToolInvocation, OutputChunkCallback)> = Vec::new();

        for mut invocation in invocations {
            let index = responses.len();

            if invocation.name == COMPLETE_TASK_TOOL {
                if completion_output.is_some() {
                    responses.push(Some(ToolResponse::error(
                        &invocation.call_id,
                        COMPLETE_TASK_TOOL,
                        "Task already marked complete in this turn.",
                    )));
                    continue;
                }
                match self.accept_completion(&invocation) {
                    Ok(output) => {
                        completion_output = Some(output);
                        responses.push(Some(ToolResponse::success(
                            &invocation.call_id,
                            COMPLETE_TASK_TOOL,
                            serde_json::Value::String("Task completed.".to_string()),
                            "Task completed.",
                        )));
                    }
                    Err(message) => {
                        responses.push(Some(ToolResponse::error(&invocation.call_id, COMPLETE_TASK_TOOL, message)));
                    }
                }
                continue;
            }

            any_non_completion = true;
            self.activity.emit(ActivityEvent::tool_call_start(
                &self.definition.name,
                &invocation.name,
                &serde_json::Value::Object(invocation.arguments.clone()),
            ));

            if !self.registry.is_authorized(&invocation.name) {
                log::warn!("executor: unauthorized tool call '{}' rejected", invocation.name);
                responses.push(Some(ToolResponse::error(&invocation.call_id, &invocation.name, "Unauthorized tool call")));
                self.activity.emit(ActivityEvent::tool_call_end(&self.definition.name, &invocation.name, &invocation.call_id, false));
                continue;
            }

            let decision = self.hooks.run_pre_tool_use(&PreToolUseEvent {
                tool_name: &invocation.name,
                call_id: &invocation.call_id,
                arguments: &serde_json::Value::Object(invocation.arguments.clone()),
                history: &[],
            });
            match decision {
                HookDecision::Block(reason) => {
                    responses.push(Some(ToolResponse::error(&invocation.call_id, &invocation.name, reason)));
                    self.activity.emit(ActivityEvent::tool_call_end(&self.definition.name, &invocation.name, &invocation.call_id, false));
                    continue;
                }
                HookDecision::Modify(value) => {
                    if let serde_json::Value::Object(map) = value {
                        invocation.arguments = map;
                    }
                }
                HookDecision::Continue => {}
            }

            let on_output_chunk: OutputChunkCallback = {
                let activity = self.activity.clone();
                let agent_name = self.definition.name.clone();
                let call_id = invocation.call_id.clone();
                Arc::new(move |chunk: &str| {
                    activity.emit(ActivityEvent::tool_output_chunk(&agent_name, &call_id, chunk));
                })
            };

            responses.push(None);
            pending.push((index, invocation, on_output_chunk));
        }

        if !pending.is_empty() {
            let registry = &self.registry;
            let executions = pending.iter().map(|(_, invocation, on_output_chunk)| {
                let on_output_chunk = on_output_chunk.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        Ok(ToolResponse::error(&invocation.call_id, &invocation.name, "cancelled"))
                    } else {
                        registry.execute(invocation, cancel, on_output_chunk).await
                    }
                }
            });
            let results = join_all(executions).await;

            for ((index, invocation, _), result) in pending.iter().zip(results) {
                let response = result?;
                let success = !response.is_error();
                any_succeeded |= success;
                self.activity.emit(ActivityEvent::tool_call_end(&self.definition.name, &invocation.name, &invocation.call_id, success));

                self.hooks.run_post_tool_use(&PostToolUseEvent {
                    tool_name: &invocation.name,
                    call_id: &invocation.call_id,
                    arguments: &serde_json::Value::Object(invocation.arguments.clone()),
                    response: &response,
                    history: &[],
                });

                let response = if success && self.definition.run.summarize_tool_output {
                    self.maybe_summarize(response).await
                } else {
                    response
                };
                responses[*index] = Some(response);
            }
        }

        let mut responses: Vec<ToolResponse> =
            responses.into_iter().map(|r| r.expect("every invocation slot is filled by either pass")).collect();

        if let Some(output) = completion_output {
            return Ok(DispatchOutcome { responses, completion_output: Some(output) });
        }

        if any_non_completion && !any_succeeded && !responses.is_empty() {
            responses.push(ToolResponse::success(
                "diagnostic",
                "system",
                serde_json::Value::String(
                    "All tool calls failed this turn. Try an alternative approach.".to_string(),
                ),
                "diagnostic note",
            ));
        }

        Ok(DispatchOutcome { responses, completion_output: None })
    }

    /// Handle one `complete_task` invocation: validate its output argument (if the
    /// definition declares one), run the optional post-processor, and return the validated
    /// output (or `None` for an output-less agent). `Err` carries the response text the
    /// caller should record and loop on (spec §4.1.3).
    fn accept_completion(&self, invocation: &ToolInvocation) -> std::result::Result<Option<serde_json::Value>, String> {
        let Some(output_spec) = &self.definition.output else {
            return Ok(None);
        };

        let Some(raw) = invocation.arguments.get(&output_spec.name) else {
            return Err(format!("Missing required argument '{}'", output_spec.name));
        };
        let validator_input = raw.clone();

        let validation = match &self.host.output_validator {
            Some(validator) => validator(&validator_input, &output_spec.schema),
            None => validate_output_schema(&validator_input, &output_spec.schema),
        };
        if let Err(message) = validation {
            return Err(message);
        }

        Ok(Some(validator_input))
    }

    async fn maybe_summarize(&mut self, response: ToolResponse) -> ToolResponse {
        let ChatAdapter::Local(adapter) = &mut self.chat else {
            return response;
        };
        match crate::summarizer::summarize(&response, &self.definition.model, crate::summarizer::SummarizerStyle::ToolCallOutput, adapter).await {
            Ok(summarized) => summarized,
            Err(e) => {
                log::warn!("executor: summarization failed, keeping original response: {e}");
                response
            }
        }
    }

    // ========================================================================
    // RECOVERY TURN (spec §4.1.2)
    // ========================================================================

    async fn run_recovery_turn(
        &mut self,
        reason: TerminationReason,
        run_start: Instant,
        turn_count: u32,
        system_prompt: &str,
    ) -> Option<Option<serde_json::Value>> {
        log::debug!("executor: agent '{}' entering recovery turn for {:?}", self.agent_id, reason);
        let grace_cancel = CancellationToken::new();
        let grace = grace_cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RECOVERY_GRACE).await;
            grace.cancel();
        });

        let explanation = match reason {
            TerminationReason::MaxTurns => "You have reached the maximum number of turns allowed. You must call `complete_task` immediately with your best available result.",
            TerminationReason::Timeout => "You have run out of time. You must call `complete_task` immediately with your best available result.",
            _ => "You must call `complete_task` immediately with your best available result.",
        };

        let message = TurnMessage::user_text(explanation);
        let schemas = self.function_declarations();
        let prompt_id = format!("{}#recovery", self.agent_id);

        let outcome = self
            .consume_model_turn(message, &schemas, &prompt_id, system_prompt, grace_cancel, CancellationToken::new())
            .await;

        let success = match outcome {
            Ok(ModelTurnOutcome::Invocations(invocations)) if !invocations.is_empty() => {
                match self.dispatch_invocations(invocations, CancellationToken::new()).await {
                    Ok(dispatch) => dispatch.completion_output,
                    Err(_) => None,
                }
            }
            _ => None,
        };

        let elapsed_ms = run_start.elapsed().as_millis();
        if let Some(telemetry) = &self.telemetry {
            telemetry(TelemetryRecord::RecoveryAttempt { reason, elapsed_ms, success: success.is_some(), turn_count });
        }
        if success.is_none() {
            self.activity.emit(ActivityEvent::error(&self.definition.name, format!("recovery turn failed for {reason:?}")));
        }
        success
    }

    fn finalize_result(&self, reason: TerminationReason, output: Option<&serde_json::Value>) -> String {
        match (reason, output, &self.host.output_post_processor) {
            (TerminationReason::Goal, Some(value), Some(post_processor)) => {
                let rendered = serde_json::to_string_pretty(value).unwrap_or_default();
                post_processor(&rendered)
            }
            (TerminationReason::Goal, Some(value), None) => serde_json::to_string_pretty(value).unwrap_or_default(),
            (TerminationReason::Goal, None, _) => "Task completed.".to_string(),
            (TerminationReason::MaxTurns, ..) => "Agent stopped: maximum turn count reached.".to_string(),
            (TerminationReason::Timeout, ..) => format!(
                "Agent timed out after {} minutes.",
                self.definition.run.max_time_minutes
            ),
            (TerminationReason::ErrorNoCompleteTaskCall, ..) => "Agent stopped: model produced no tool calls.".to_string(),
            (TerminationReason::Aborted, ..) => "Agent aborted by operator.".to_string(),
            (TerminationReason::Error, ..) => "Agent failed with an unrecovered error.".to_string(),
        }
    }
}

enum ModelTurnOutcome {
    Invocations(Vec<ToolInvocation>),
    Cancelled,
}

struct DispatchOutcome {
    responses: Vec<ToolResponse>,
    completion_output: Option<Option<serde_json::Value>>,
}

fn emit_stream_activity(activity: &ActivitySink, agent_name: &str, event: &ModelStreamEvent) {
    match event {
        ModelStreamEvent::ThoughtDelta(text) => activity.emit(ActivityEvent::thought_chunk(agent_name, extract_thought_subject(text))),
        ModelStreamEvent::TextDelta(text) => activity.emit(ActivityEvent::thought_chunk(agent_name, text.clone())),
        _ => {}
    }
}

/// Isolate a short subject line from a "thought" segment: the first non-empty line, capped
/// at 120 characters (spec §4.1.6).
fn extract_thought_subject(text: &str) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or(text).trim();
    if first_line.chars().count() > 120 {
        first_line.chars().take(120).collect()
    } else {
        first_line.to_string()
    }
}

/// Build the `complete_task` function declaration (spec §3): a single required parameter
/// whose schema equals the output schema when one is declared, otherwise no parameters.
fn completion_tool_declaration(definition: &AgentDefinition) -> FunctionDeclaration {
    let parameters_json_schema = match &definition.output {
        Some(output) => serde_json::json!({
            "type": "object",
            "properties": { output.name.clone(): output.schema.clone() },
            "required": [output.name.clone()],
        }),
        None => serde_json::json!({ "type": "object", "properties": {}, "required": [] }),
    };
    FunctionDeclaration {
        name: COMPLETE_TASK_TOOL.to_string(),
        description: "Signal that the task is complete.".to_string(),
        parameters_json_schema,
    }
}

/// Apply the Gemma-compatible transform (spec §4.1.5): rename `parameters_json_schema` to
/// `parameters`, and strip any parameter literally named `description` from both the
/// properties map and the required list — a compatibility hack for small local models that
/// misparse nested `description` fields.
fn render_gemma_compatible_schemas(schemas: &[FunctionDeclaration]) -> String {
    let transformed: Vec<serde_json::Value> = schemas
        .iter()
        .map(|decl| {
            let mut parameters = decl.parameters_json_schema.clone();
            if let Some(obj) = parameters.as_object_mut() {
                if let Some(props) = obj.get_mut("properties").and_then(|p| p.as_object_mut()) {
                    props.remove("description");
                }
                if let Some(required) = obj.get_mut("required").and_then(|r| r.as_array_mut()) {
                    required.retain(|v| v.as_str() != Some("description"));
                }
            }
            serde_json::json!({
                "name": decl.name,
                "description": decl.description,
                "parameters": parameters,
            })
        })
        .collect();
    serde_json::to_string_pretty(&transformed).unwrap_or_default()
}

/// Fallback completion synthesis for weak local models (spec §4.1.7): when zero tool
/// invocations were parsed but the agent declares an output, treat the terminal text as the
/// completion argument, parsed as JSON if possible.
fn synthesize_fallback_completion(terminal_text: &str, prompt_id: &str) -> ToolInvocation {
    let mut arguments = serde_json::Map::new();
    let parsed = serde_json::from_str::<serde_json::Value>(terminal_text.trim()).ok();
    let value = parsed.unwrap_or_else(|| serde_json::Value::String(terminal_text.trim().to_string()));
    arguments.insert("Response".to_string(), value);
    ToolInvocation::new(format!("{prompt_id}-fallback"), COMPLETE_TASK_TOOL, arguments)
}

/// Minimal structural validator for a `complete_task` output argument against a JSON-schema
/// subset (`type`, `properties`, `required`). Not a full JSON-schema engine — this crate
/// carries no such dependency (see DESIGN.md) — but enough to honor spec §4.1.3's validation
/// requirement for the common string/number/boolean/object shapes an agent output declares.
fn validate_output_schema(value: &serde_json::Value, schema: &serde_json::Value) -> std::result::Result<(), String> {
    let Some(expected_type) = schema.get("type").and_then(|t| t.as_str()) else {
        return Ok(());
    };
    let matches = match expected_type {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    };
    if !matches {
        return Err(format!("expected type '{expected_type}', got {value}"));
    }
    if expected_type == "object" {
        if let (Some(obj), Some(required)) = (value.as_object(), schema.get("required").and_then(|r| r.as_array())) {
            for field in required {
                if let Some(name) = field.as_str() {
                    if !obj.contains_key(name) {
                        return Err(format!("missing required field '{name}'"));
                    }
                }
            }
        }
    }
    Ok(())
}

fn random_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..6).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{InputSpec, ModelConfig, OutputSpec};
    use crate::tools::ToolReference;

    #[test]
    fn completion_tool_has_no_params_without_output_spec() {
        let definition = AgentDefinition::builder("a")
            .system_prompt_template("sys")
            .model(ModelConfig::Remote { model: "m".into(), temperature: None, max_output_tokens: None })
            .build()
            .unwrap();
        let decl = completion_tool_declaration(&definition);
        assert_eq!(decl.parameters_json_schema["required"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn completion_tool_requires_output_field_when_declared() {
        let definition = AgentDefinition::builder("a")
            .system_prompt_template("sys")
            .output(OutputSpec::new("Response", serde_json::json!({"type": "string"})))
            .model(ModelConfig::Remote { model: "m".into(), temperature: None, max_output_tokens: None })
            .build()
            .unwrap();
        let decl = completion_tool_declaration(&definition);
        assert_eq!(decl.parameters_json_schema["required"][0], "Response");
    }

    #[test]
    fn gemma_transform_strips_description_param_and_renames_key() {
        let schemas = vec![FunctionDeclaration {
            name: "shell".into(),
            description: "runs a shell command".into(),
            parameters_json_schema: serde_json::json!({
                "type": "object",
                "properties": { "command": {"type": "string"}, "description": {"type": "string"} },
                "required": ["command", "description"],
            }),
        }];
        let rendered = render_gemma_compatible_schemas(&schemas);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert!(parsed[0].get("parameters").is_some());
        assert!(parsed[0]["parameters"]["properties"].get("description").is_none());
        assert!(!parsed[0]["parameters"]["required"].as_array().unwrap().iter().any(|v| v == "description"));
    }

    #[test]
    fn validate_output_schema_rejects_wrong_type() {
        let schema = serde_json::json!({"type": "string"});
        let err = validate_output_schema(&serde_json::json!(7), &schema).unwrap_err();
        assert!(err.contains("string"));
    }

    #[test]
    fn validate_output_schema_accepts_matching_type() {
        let schema = serde_json::json!({"type": "string"});
        assert!(validate_output_schema(&serde_json::json!("ok"), &schema).is_ok());
    }

    #[test]
    fn fallback_completion_parses_json_terminal_text() {
        let invocation = synthesize_fallback_completion(r#"{"Response": "done"}"#, "p");
        assert_eq!(invocation.name, COMPLETE_TASK_TOOL);
        assert_eq!(invocation.arguments.get("Response").unwrap(), "done");
    }

    #[test]
    fn fallback_completion_wraps_plain_text() {
        let invocation = synthesize_fallback_completion("just some prose", "p");
        assert_eq!(invocation.arguments.get("Response").unwrap(), "just some prose");
    }

    #[test]
    fn thought_subject_caps_at_120_chars_from_first_line() {
        let long = "x".repeat(200);
        let subject = extract_thought_subject(&long);
        assert_eq!(subject.chars().count(), 120);
    }

    #[tokio::test]
    async fn new_rejects_non_allow_listed_tool() {
        let definition = AgentDefinition::builder("a")
            .system_prompt_template("sys")
            .tool(ToolReference::Name("interactive_confirm".into()))
            .model(ModelConfig::Local {
                model: "m".into(),
                base_url: "http://localhost:1234/v1".into(),
                temperature: None,
                max_output_tokens: None,
            })
            .build()
            .unwrap();

        let host = HostContext::new(Arc::new(crate::tools::StaticToolRegistry::new()));
        let (sink, _rx) = crate::activity::channel();
        let chat = ChatAdapter::Local(crate::chat::LocalChatAdapter::new_for_test());
        let result = Executor::new(definition, host, chat, sink, None);
        assert!(result.is_err());
    }

    #[test]
    fn input_spec_requires_non_empty_description_is_enforced_upstream() {
        // Guard: AgentDefinitionBuilder already rejects this; Executor::new relies on
        // receiving an already-validated definition.
        let err = AgentDefinition::builder("a")
            .system_prompt_template("sys")
            .input(InputSpec::new("x", "", true))
            .model(ModelConfig::Remote { model: "m".into(), temperature: None, max_output_tokens: None })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
