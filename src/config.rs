//! # Provider Configuration Helpers
//!
//! Thin helpers for resolving a local model server's base URL and model name, with
//! environment-variable overrides. Kept from the teacher's `config` module (see `lib.rs`'s
//! doc comments for its described surface). Neither the executor nor the chat adapters talk
//! HTTP directly — a host builds the concrete `LocalModelTransport` itself — so these are
//! surfaced through [`crate::definition::ModelConfig::local_for_provider`], which a host calls
//! while building an agent's model configuration instead of hardcoding an endpoint.

use std::env;

/// Supported local OpenAI-compatible model servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    LmStudio,
    Ollama,
    LlamaCpp,
    VLlm,
}

impl Provider {
    fn default_base_url(self) -> &'static str {
        match self {
            Provider::LmStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LlamaCpp => "http://localhost:8080/v1",
            Provider::VLlm => "http://localhost:8000/v1",
        }
    }

    fn env_var(self) -> &'static str {
        match self {
            Provider::LmStudio => "LMSTUDIO_BASE_URL",
            Provider::Ollama => "OLLAMA_BASE_URL",
            Provider::LlamaCpp => "LLAMACPP_BASE_URL",
            Provider::VLlm => "VLLM_BASE_URL",
        }
    }

    fn model_env_var(self) -> &'static str {
        match self {
            Provider::LmStudio => "LMSTUDIO_MODEL",
            Provider::Ollama => "OLLAMA_MODEL",
            Provider::LlamaCpp => "LLAMACPP_MODEL",
            Provider::VLlm => "VLLM_MODEL",
        }
    }
}

/// Resolve a provider's base URL. Priority: environment variable override, then the
/// provider's documented default, then `fallback` if the provider gave no default (never
/// happens today, but keeps the signature total for future providers).
pub fn get_base_url(provider: Provider, fallback: &str) -> String {
    env::var(provider.env_var()).unwrap_or_else(|_| {
        let default = provider.default_base_url();
        if default.is_empty() {
            fallback.to_string()
        } else {
            default.to_string()
        }
    })
}

/// Resolve a model name. When `prefer_env` is true, an environment variable override wins
/// over `fallback`; otherwise `fallback` is used verbatim (the agent definition already
/// pinned an explicit model and does not want a stray env var to silently swap it).
pub fn get_model(provider: Provider, fallback: &str, prefer_env: bool) -> String {
    if prefer_env {
        if let Ok(model) = env::var(provider.model_env_var()) {
            return model;
        }
    }
    fallback.to_string()
}
