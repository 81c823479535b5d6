//! Vision/text inference service.
//!
//! The agent treats the model as an unreliable oracle: every call may fail,
//! time out, come back empty or return prose instead of the requested shape.
//! Callers degrade to safe defaults rather than propagating failures.
//!
//! - `VlmClient` talks to an OpenAI-compatible chat-completions endpoint
//! - `ScriptedInference` answers from per-prompt-kind queues (tests, demo)

pub mod client;
pub mod scripted;

pub use client::{VlmClient, check_health};
pub use scripted::ScriptedInference;

use std::time::Duration;
use thiserror::Error;

/// Result type for inference operations
pub type VlmResult<T> = Result<T, VlmError>;

/// Errors that can occur during inference
#[derive(Debug, Error)]
pub enum VlmError {
    /// Failed to connect to the endpoint
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Request did not complete in time
    #[error("No response for {0:?}")]
    Timeout(Duration),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Response carried no text
    #[error("Empty response")]
    EmptyResponse,

    /// Provider refused to answer
    #[error("Response blocked: {0}")]
    Blocked(String),
}

/// A vision/text model the agent can query.
///
/// `image` is PNG bytes when present; `temperature` is forwarded as the
/// sampling temperature.
pub trait InferenceService: Send + Sync {
    fn infer(&self, image: Option<&[u8]>, prompt: &str, temperature: f32) -> VlmResult<String>;
}

/// Which component issued a prompt. Each prompt opens with its kind's role
/// line, which lets scripted services route answers without parsing prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Classify,
    Verify,
    Locate,
    Plan,
}

impl PromptKind {
    pub const ALL: [PromptKind; 4] = [
        PromptKind::Classify,
        PromptKind::Verify,
        PromptKind::Locate,
        PromptKind::Plan,
    ];

    /// Opening line of every prompt of this kind
    pub fn role(self) -> &'static str {
        match self {
            PromptKind::Classify => "You are a screen classifier for an Android app under test.",
            PromptKind::Verify => "You are a mobile QA supervisor.",
            PromptKind::Locate => "You are a UI element locator for Android screenshots.",
            PromptKind::Plan => "You are a mobile QA agent deciding the next action.",
        }
    }

    /// Identify the kind of a prompt from its role line
    pub fn of(prompt: &str) -> Option<PromptKind> {
        let head = prompt.trim_start();
        Self::ALL.into_iter().find(|kind| head.starts_with(kind.role()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_kind_detection() {
        for kind in PromptKind::ALL {
            let prompt = format!("\n  {}\nrest of prompt", kind.role());
            assert_eq!(PromptKind::of(&prompt), Some(kind));
        }
        assert_eq!(PromptKind::of("Describe this image"), None);
    }
}
