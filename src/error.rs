//! # Error Types for the Sub-Agent Execution Engine
//!
//! This module defines all error types used throughout the crate, providing comprehensive
//! error handling with detailed context for different failure scenarios.
//!
//! ## Design Philosophy
//!
//! - **Explicit Error Handling**: Uses Rust's `Result<T>` type for all fallible operations
//! - **No Silent Failures**: All errors are propagated explicitly to the caller
//! - **Rich Context**: Each error variant provides specific information about what went wrong
//! - **Easy Conversion**: Automatic conversion from common error types (reqwest, serde_json)
//!
//! ## Recoverable vs. terminal
//!
//! Not every variant here ends a run. [`Error::Unauthorized`], [`Error::ToolFailure`] and
//! [`Error::ValidationFailure`] are recovered locally by the executor and folded into a
//! tool-response part for the next turn. [`Error::Configuration`] fails agent construction.
//! The rest (`ProtocolViolation`, `Timeout`, `Aborted`, `RecoveryFailed`) become terminal
//! reasons once the recovery turn (if any) has run its course.
//!
//! ## Usage
//!
//! ```ignore
//! use subagent_exec::{Error, Result};
//!
//! fn example() -> Result<()> {
//!     if some_condition {
//!         return Err(Error::config("Invalid model name"));
//!     }
//!
//!     let response = http_client.get(url).send().await?; // Auto-converts to Error::Http
//!     let json = serde_json::from_str(data)?; // Auto-converts to Error::Json
//!
//!     Ok(())
//! }
//! ```

use thiserror::Error;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Type alias for `Result<T, Error>` used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// ERROR ENUM
// ============================================================================

/// Comprehensive error type covering all failure modes in the crate.
///
/// This enum uses the `thiserror` crate to automatically implement `std::error::Error`
/// and provide well-formatted error messages.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed due to network issues, connection problems, or HTTP errors.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration provided when building an `AgentDefinition` or `Executor`.
    ///
    /// Raised at `Executor::new` time (or `AgentDefinition` validation) when a tool in the
    /// definition is not on the non-interactive allow-list, when prompt configuration has
    /// neither a system prompt nor initial messages, when `max_turns < 1` or
    /// `max_time_minutes < 1`, or when an input/output schema is malformed.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Error response received from the model server's API.
    #[error("API error: {0}")]
    Api(String),

    /// Error occurred while processing the streaming response.
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Tool execution returned an error, propagated with the original message.
    #[error("Tool execution error: {0}")]
    ToolFailure(String),

    /// Invalid input provided by the user (e.g. a required agent input was missing).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The model stream produced zero tool invocations and no `complete_task` call.
    ///
    /// Corresponds to the `AWAITING_MODEL -- stream completes with 0 invocations -->
    /// TERMINATING(no-complete-task)` transition in the turn state machine.
    #[error("Protocol violation: model turn produced no tool calls and no completion")]
    ProtocolViolation,

    /// `complete_task` arguments failed the output schema, or the required output field
    /// was missing.
    #[error("Validation failed: {0}")]
    ValidationFailure(String),

    /// The model invoked a tool name that is not in this agent's filtered tool registry.
    #[error("Unauthorized tool call: {0}")]
    Unauthorized(String),

    /// The per-run wall-clock timer elapsed.
    #[error("Request timeout")]
    Timeout,

    /// The operator issued a hard (double) interrupt; the run terminates immediately
    /// without attempting a recovery turn.
    #[error("Aborted by operator")]
    Aborted,

    /// The recovery turn granted after a recoverable limit exhaustion did not yield a
    /// valid `complete_task` call within its grace window.
    #[error("Recovery attempt failed: {0}")]
    RecoveryFailed(String),

    /// Miscellaneous error that doesn't fit other categories.
    #[error("Error: {0}")]
    Other(String),
}

// ============================================================================
// CONVENIENCE CONSTRUCTORS
// ============================================================================

impl Error {
    /// Create a new configuration error with a descriptive message.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new API error with the server's error message.
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new streaming error for SSE parsing or stream processing failures.
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool execution error.
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::ToolFailure(msg.into())
    }

    /// Create a new invalid input error for user input validation failures.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new validation-failure error (invalid or missing `complete_task` output).
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::ValidationFailure(msg.into())
    }

    /// Create a new unauthorized-tool error naming the rejected tool.
    pub fn unauthorized(tool_name: impl Into<String>) -> Self {
        Error::Unauthorized(tool_name.into())
    }

    /// Create a new recovery-failed error.
    pub fn recovery_failed(msg: impl Into<String>) -> Self {
        Error::RecoveryFailed(msg.into())
    }

    /// Create a new miscellaneous error for cases that don't fit other categories.
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error indicating the operation exceeded the time limit.
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Create an aborted error indicating a hard operator interrupt.
    pub fn aborted() -> Self {
        Error::Aborted
    }
}

// ============================================================================
// TESTS
// ============================================================================
