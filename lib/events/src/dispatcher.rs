//! Executes event tools against the shared slot pool.

use crate::pool::{Reservation, SlotPool};
use crate::tools::{EVENT_FULL_REASON, EventTool, Registration};
use async_trait::async_trait;
use callhandler_ai::ToolInvocation;
use callhandler_conversation::{
    ToolDispatcher, ToolError, ToolRegistry, ToolResult, ToolResultMetadata,
};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Dispatcher for [`EventTool`] invocations.
///
/// Holds no lock of its own; every shared mutation goes through the
/// [`SlotPool`].
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    pool: Arc<SlotPool>,
    registry: Arc<ToolRegistry>,
}

impl EventDispatcher {
    /// Creates a dispatcher over the given pool and tool declarations.
    #[must_use]
    pub fn new(pool: Arc<SlotPool>, registry: Arc<ToolRegistry>) -> Self {
        Self { pool, registry }
    }

    fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult, ToolError> {
        let unknown = || ToolError::UnknownTool {
            name: invocation.name.clone(),
        };
        let tool = EventTool::from_name(&invocation.name).ok_or_else(unknown)?;
        let definition = self.registry.get(tool.name()).ok_or_else(unknown)?;
        definition.validate_arguments(&invocation.arguments)?;

        let result = match tool {
            EventTool::HangUp => {
                ToolResult::success(&invocation.id, tool.name(), JsonValue::Null).ending_call()
            }
            EventTool::CheckEventAvailability => ToolResult::success(
                &invocation.id,
                tool.name(),
                json!({ "open_slot_count": self.pool.availability() }),
            ),
            EventTool::RegisterForEvent => {
                let registration: Registration =
                    serde_json::from_value(invocation.arguments.clone()).map_err(|err| {
                        ToolError::InvalidArguments {
                            name: tool.name().to_string(),
                            reason: err.to_string(),
                        }
                    })?;
                self.register(&invocation.id, &registration)
            }
        };

        Ok(result.with_metadata(ToolResultMetadata {
            has_side_effects: definition.has_side_effects,
            ..Default::default()
        }))
    }

    fn register(&self, correlation_id: &str, registration: &Registration) -> ToolResult {
        let name = EventTool::RegisterForEvent.name();
        match self.pool.reserve() {
            Reservation::Granted { remaining } => {
                info!(
                    phone = %mask_phone(&registration.phone_number),
                    remaining,
                    "caller registered"
                );
                ToolResult::success(
                    correlation_id,
                    name,
                    json!({ "status": "success", "full_name": registration.full_name }),
                )
            }
            Reservation::Denied => {
                info!(
                    phone = %mask_phone(&registration.phone_number),
                    "registration denied, event is full"
                );
                ToolResult::failure(
                    correlation_id,
                    name,
                    EVENT_FULL_REASON,
                    json!({ "status": "failed", "reason": EVENT_FULL_REASON }),
                )
            }
        }
    }
}

#[async_trait]
impl ToolDispatcher for EventDispatcher {
    #[instrument(skip_all, fields(tool = %invocation.name, correlation_id = %invocation.id))]
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolResult {
        let started = Instant::now();
        let result = match self.execute(invocation) {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "tool invocation rejected");
                ToolResult::from_error(invocation, &err)
            }
        };
        result.with_execution_time(started.elapsed())
    }
}

/// Keeps only the last four digits of a phone number for logs.
fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("***{tail}")
}
