//! The event registration tool set.

use callhandler_conversation::{
    ParameterKind, ToolDefinition, ToolError, ToolParameter, ToolRegistry,
};
use serde::Deserialize;

/// Failure reason reported when no slot is left.
pub const EVENT_FULL_REASON: &str = "event is full";

/// Tools the model may call during a registration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTool {
    /// End the call after the current reply.
    HangUp,
    /// Report how many slots are open.
    CheckEventAvailability,
    /// Take a slot for the caller.
    RegisterForEvent,
}

impl EventTool {
    /// Every tool, in the order presented to the model.
    pub const ALL: [Self; 3] = [
        Self::HangUp,
        Self::CheckEventAvailability,
        Self::RegisterForEvent,
    ];

    /// Returns the name the model uses.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::HangUp => "hang_up",
            Self::CheckEventAvailability => "check_event_availability",
            Self::RegisterForEvent => "register_for_event",
        }
    }

    /// Looks a tool up by the name the model used.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Returns the declaration shown to the model.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        match self {
            Self::HangUp => ToolDefinition::new(
                self.name(),
                "Hang up the call when the caller no longer has any other questions.",
            ),
            Self::CheckEventAvailability => ToolDefinition::new(
                self.name(),
                "Check if the event still has open slots before registering the caller.",
            )
            .with_result_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "open_slot_count": {
                        "type": "number",
                        "description": "The number of open slots available for registering.",
                    },
                },
            })),
            Self::RegisterForEvent => ToolDefinition::new(
                self.name(),
                "Register the caller for the event. Before registering, make sure the event still has open slots.",
            )
            .with_parameter(ToolParameter::required(
                "full_name",
                ParameterKind::String,
                "The full name of the caller",
            ))
            .with_parameter(ToolParameter::required(
                "phone_number",
                ParameterKind::String,
                "The phone number of the caller",
            ))
            .with_result_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "status": { "type": "string", "enum": ["success", "failed"] },
                    "full_name": { "type": "string" },
                    "reason": { "type": "string" },
                },
                "required": ["status"],
            }))
            .with_side_effects(),
        }
    }
}

/// Builds the registry of every event tool.
///
/// # Errors
///
/// Returns `DuplicateTool` if two tools share a name.
pub fn event_tool_registry() -> Result<ToolRegistry, ToolError> {
    ToolRegistry::from_definitions(EventTool::ALL.map(EventTool::definition))
}

/// Arguments of `register_for_event`, once validated.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Registration {
    pub full_name: String,
    pub phone_number: String,
}
