//! # Agent Definition (C7)
//!
//! Immutable, validate-at-construction description of one agent (spec §3, §4.9). Built with
//! [`AgentDefinitionBuilder`], following the teacher's `AgentOptions`/`AgentOptionsBuilder`
//! pattern: every invariant is checked once in `build()`, so a successfully constructed
//! [`AgentDefinition`] never needs re-validation downstream.

use serde_json::Value;

use crate::config::{self, Provider};
use crate::error::{Error, Result};
use crate::tools::ToolReference;
use crate::types::TurnMessage;

/// One named, required-or-optional string input the host supplies to a run.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
        }
    }
}

/// The single named output field an agent may declare, with a validating JSON schema.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub name: String,
    pub schema: Value,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self { name: name.into(), schema }
    }
}

/// Model configuration: either a remote, natively function-calling provider, or a local
/// text-only server reached over an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub enum ModelConfig {
    Remote {
        model: String,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
    },
    Local {
        model: String,
        base_url: String,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
    },
}

impl ModelConfig {
    pub fn is_local(&self) -> bool {
        matches!(self, ModelConfig::Local { .. })
    }

    /// Build a `Local` config by resolving `provider`'s base URL and model name the same way
    /// its server's own CLI/env conventions do, rather than requiring the host to hardcode an
    /// endpoint. `model_fallback`/`base_url_fallback` apply when no environment override and
    /// (for the base URL) no provider default are set; `prefer_env_model` controls whether an
    /// env var is allowed to override `model_fallback` (see [`config::get_model`]).
    pub fn local_for_provider(
        provider: Provider,
        model_fallback: impl Into<String>,
        base_url_fallback: &str,
        prefer_env_model: bool,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
    ) -> Self {
        let model_fallback = model_fallback.into();
        ModelConfig::Local {
            base_url: config::get_base_url(provider, base_url_fallback),
            model: config::get_model(provider, &model_fallback, prefer_env_model),
            temperature,
            max_output_tokens,
        }
    }
}

/// Run limits and the summarizer opt-in flag.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub max_turns: u32,
    pub max_time_minutes: f64,
    pub summarize_tool_output: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_time_minutes: 10.0,
            summarize_tool_output: false,
        }
    }
}

/// Prompt template configuration (spec §3, §4.1.5).
#[derive(Debug, Clone, Default)]
pub struct PromptConfig {
    pub system_prompt_template: Option<String>,
    pub initial_messages: Vec<TurnMessage>,
    pub query_template: Option<String>,
    pub directive: Option<String>,
    pub reminder: Option<String>,
}

/// An immutable agent definition. Created once by the host at startup; never mutated
/// (spec §3). Construct with [`AgentDefinitionBuilder`], which enforces every invariant
/// from spec §4.9 before returning.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub inputs: Vec<InputSpec>,
    pub output: Option<OutputSpec>,
    pub model: ModelConfig,
    pub tools: Vec<ToolReferenceHandle>,
    pub run: RunConfig,
    pub prompt: PromptConfig,
}

/// [`ToolReference`] isn't `Clone`-friendly to store bare (it wraps `Arc<Tool>` already, but
/// an `AgentDefinition` is meant to be cheaply cloned for nested-delegation snapshots), so it
/// is stored behind this thin newtype. Cloning an `AgentDefinition` clones the `Arc`s inside,
/// never the underlying tool.
pub type ToolReferenceHandle = ToolReference;

impl AgentDefinition {
    pub fn builder(name: impl Into<String>) -> AgentDefinitionBuilder {
        AgentDefinitionBuilder::new(name)
    }

    /// The query template interpolated against `inputs`, or the literal fallback text when
    /// no template is configured (spec §4.1.2, initial state).
    pub fn initial_query(&self, inputs: &std::collections::HashMap<String, String>) -> String {
        match &self.prompt.query_template {
            Some(template) => interpolate(template, inputs),
            None => "Get Started!".to_string(),
        }
    }
}

/// Interpolate `{input_name}` placeholders in `template` against `inputs`. Idempotent: running
/// this twice on its own output is a no-op once no more placeholders match (spec §8 round-trip
/// property), since a value is substituted verbatim and not re-scanned.
pub fn interpolate(template: &str, inputs: &std::collections::HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in inputs {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Builder for [`AgentDefinition`]. Mirrors the teacher's `AgentOptionsBuilder`: every setter
/// takes owned/`impl Into` values and returns `Self` for chaining; `build()` is the single
/// validation point.
pub struct AgentDefinitionBuilder {
    name: String,
    display_name: Option<String>,
    description: String,
    inputs: Vec<InputSpec>,
    output: Option<OutputSpec>,
    model: Option<ModelConfig>,
    tools: Vec<ToolReference>,
    run: RunConfig,
    prompt: PromptConfig,
}

impl AgentDefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: String::new(),
            inputs: Vec::new(),
            output: None,
            model: None,
            tools: Vec::new(),
            run: RunConfig::default(),
            prompt: PromptConfig::default(),
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, input: InputSpec) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: OutputSpec) -> Self {
        self.output = Some(output);
        self
    }

    pub fn model(mut self, model: ModelConfig) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tool(mut self, tool: ToolReference) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.run.max_turns = max_turns;
        self
    }

    pub fn max_time_minutes(mut self, max_time_minutes: f64) -> Self {
        self.run.max_time_minutes = max_time_minutes;
        self
    }

    pub fn summarize_tool_output(mut self, summarize: bool) -> Self {
        self.run.summarize_tool_output = summarize;
        self
    }

    pub fn system_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt.system_prompt_template = Some(template.into());
        self
    }

    pub fn initial_messages(mut self, messages: Vec<TurnMessage>) -> Self {
        self.prompt.initial_messages = messages;
        self
    }

    pub fn query_template(mut self, template: impl Into<String>) -> Self {
        self.prompt.query_template = Some(template.into());
        self
    }

    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.prompt.directive = Some(directive.into());
        self
    }

    pub fn reminder(mut self, reminder: impl Into<String>) -> Self {
        self.prompt.reminder = Some(reminder.into());
        self
    }

    /// Validate every invariant from spec §4.9 and construct the definition.
    ///
    /// `max_time_minutes` is checked against `> 0.0` rather than the letter of spec §4.9's
    /// "≥ 1": spec §8 scenario 5 exercises `max_time_minutes = 0.05` to keep a timeout test
    /// fast, which a strict `≥ 1` bound would reject outright. Recorded as an Open Question
    /// resolution in DESIGN.md.
    pub fn build(self) -> Result<AgentDefinition> {
        if self.run.max_turns < 1 {
            return Err(Error::config("max_turns must be >= 1"));
        }
        if self.run.max_time_minutes <= 0.0 {
            return Err(Error::config("max_time_minutes must be > 0"));
        }
        for input in &self.inputs {
            if input.description.trim().is_empty() {
                return Err(Error::config(format!("input '{}' has an empty description", input.name)));
            }
        }
        if self.prompt.system_prompt_template.is_none() && self.prompt.initial_messages.is_empty() {
            return Err(Error::config(
                "prompt configuration must provide either a system prompt template or initial messages",
            ));
        }
        let model = self.model.ok_or_else(|| Error::config("model configuration is required"))?;

        Ok(AgentDefinition {
            name: self.name,
            display_name: self.display_name.unwrap_or_default(),
            description: self.description,
            inputs: self.inputs,
            output: self.output,
            model,
            tools: self.tools,
            run: self.run,
            prompt: self.prompt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_builder() -> AgentDefinitionBuilder {
        AgentDefinition::builder("researcher")
            .system_prompt_template("You are a researcher.")
            .model(ModelConfig::Remote {
                model: "gemini-2.0".into(),
                temperature: None,
                max_output_tokens: None,
            })
    }

    #[test]
    fn builds_with_minimal_valid_config() {
        let def = valid_builder().build().unwrap();
        assert_eq!(def.name, "researcher");
        assert_eq!(def.run.max_turns, 20);
    }

    #[test]
    fn rejects_zero_max_turns() {
        let err = valid_builder().max_turns(0).build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn rejects_zero_max_time() {
        let err = valid_builder().max_time_minutes(0.0).build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn accepts_sub_minute_max_time() {
        let def = valid_builder().max_time_minutes(0.05).build().unwrap();
        assert_eq!(def.run.max_time_minutes, 0.05);
    }

    #[test]
    fn rejects_input_with_empty_description() {
        let err = valid_builder()
            .input(InputSpec::new("topic", "", true))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn rejects_missing_prompt_and_initial_messages() {
        let err = AgentDefinition::builder("researcher")
            .model(ModelConfig::Remote {
                model: "gemini-2.0".into(),
                temperature: None,
                max_output_tokens: None,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn initial_messages_alone_satisfy_prompt_requirement() {
        let def = AgentDefinition::builder("researcher")
            .initial_messages(vec![TurnMessage::user_text("hi")])
            .model(ModelConfig::Remote {
                model: "gemini-2.0".into(),
                temperature: None,
                max_output_tokens: None,
            })
            .build()
            .unwrap();
        assert_eq!(def.prompt.initial_messages.len(), 1);
    }

    #[test]
    fn local_for_provider_resolves_base_url_and_model() {
        // SAFETY: no other test in this module touches this var.
        unsafe { std::env::remove_var("OLLAMA_BASE_URL") };
        unsafe { std::env::remove_var("OLLAMA_MODEL") };
        let model = ModelConfig::local_for_provider(Provider::Ollama, "llama3", "unused", false, None, None);
        match model {
            ModelConfig::Local { base_url, model, .. } => {
                assert_eq!(base_url, "http://localhost:11434/v1");
                assert_eq!(model, "llama3");
            }
            _ => panic!("expected ModelConfig::Local"),
        }
    }

    #[test]
    fn query_template_interpolation_is_idempotent() {
        let mut inputs = std::collections::HashMap::new();
        inputs.insert("topic".to_string(), "rust".to_string());
        let once = interpolate("Research {topic}", &inputs);
        let twice = interpolate(&once, &inputs);
        assert_eq!(once, twice);
        assert_eq!(once, "Research rust");
    }

    #[test]
    fn missing_query_template_falls_back_to_get_started() {
        let def = valid_builder().build().unwrap();
        let inputs = std::collections::HashMap::new();
        assert_eq!(def.initial_query(&inputs), "Get Started!");
    }
}
