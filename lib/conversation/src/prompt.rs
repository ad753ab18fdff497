//! System prompt for call handling.

use crate::marker::END_CONVERSATION_MARKER;
use serde::{Deserialize, Serialize};

/// Content standing in for a caller who said nothing.
pub const SILENCE_INSTRUCTION: &str = "The caller was silent. Please respond naturally as if you're talking to someone who hasn't said anything.";

/// Default instructions given to the model on every turn.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful phone agent taking registrations for an upcoming event. \
Keep responses clear and concise, under 50 words. \
Before registering a caller, check that the event still has open slots and ask for their full name and phone number. \
When the caller has nothing else to ask, use the hang_up tool.";

/// The system prompt, split into the part sent on every turn and the part
/// added on follow-up turns only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPrompt {
    /// Sent on every turn.
    pub instructions: String,
    /// Appended from the second caller turn on.
    pub follow_up_instructions: String,
}

impl SystemPrompt {
    /// Creates a prompt with custom base instructions.
    #[must_use]
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            ..Self::default()
        }
    }

    /// Renders the prompt for a turn.
    #[must_use]
    pub fn render(&self, follow_up: bool) -> String {
        if follow_up {
            format!("{}\n{}", self.instructions, self.follow_up_instructions)
        } else {
            self.instructions.clone()
        }
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            follow_up_instructions: format!(
                "If the caller says goodbye, thanks, or indicates they're done, include '{END_CONVERSATION_MARKER}' at the end of your response."
            ),
        }
    }
}
