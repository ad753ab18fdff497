//! Tool declarations, the tool registry, and the dispatch contract.
//!
//! Declarations say what the model may call and with which arguments.
//! Executing logic lives behind [`ToolDispatcher`], so the registry can be
//! shared read-only across every call while implementations bind their own
//! state.

use crate::error::ToolError;
use async_trait::async_trait;
use callhandler_ai::{ToolInvocation, ToolSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// A JSON string.
    String,
    /// Any JSON number.
    Number,
    /// A JSON number without a fractional part.
    Integer,
    /// A JSON boolean.
    Boolean,
}

impl ParameterKind {
    /// Returns the JSON schema type name.
    #[must_use]
    pub fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    /// Returns true if the value has this kind.
    #[must_use]
    pub fn matches(self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// One argument of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Argument name.
    pub name: String,
    /// Expected JSON type.
    pub kind: ParameterKind,
    /// Description shown to the model.
    pub description: String,
    /// Whether the argument must be present.
    pub required: bool,
}

impl ToolParameter {
    /// Creates a required parameter.
    #[must_use]
    pub fn required(
        name: impl Into<String>,
        kind: ParameterKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    /// Creates an optional parameter.
    #[must_use]
    pub fn optional(
        name: impl Into<String>,
        kind: ParameterKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Definition of a tool available during a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Declared arguments, in declaration order.
    pub parameters: Vec<ToolParameter>,
    /// JSON schema of the result payload, if the tool returns one.
    pub result_schema: Option<JsonValue>,
    /// Whether running the tool changes shared state.
    pub has_side_effects: bool,
}

impl ToolDefinition {
    /// Creates a new tool definition without arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            result_schema: None,
            has_side_effects: false,
        }
    }

    /// Adds an argument.
    #[must_use]
    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Sets the result schema.
    #[must_use]
    pub fn with_result_schema(mut self, schema: JsonValue) -> Self {
        self.result_schema = Some(schema);
        self
    }

    /// Marks this tool as changing shared state.
    #[must_use]
    pub fn with_side_effects(mut self) -> Self {
        self.has_side_effects = true;
        self
    }

    /// Builds the JSON schema of the arguments object.
    #[must_use]
    pub fn input_schema(&self) -> JsonValue {
        let properties: serde_json::Map<String, JsonValue> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({
                        "type": p.kind.json_type(),
                        "description": p.description,
                    }),
                )
            })
            .collect();

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Checks argument presence and types against the declaration.
    ///
    /// `null` counts as an empty object. Undeclared arguments are ignored.
    /// A required string argument that is blank counts as missing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments` describing the first problem found.
    pub fn validate_arguments(&self, arguments: &JsonValue) -> Result<(), ToolError> {
        let empty = serde_json::Map::new();
        let object = match arguments {
            JsonValue::Object(map) => map,
            JsonValue::Null => &empty,
            _ => return Err(self.invalid("arguments must be a JSON object")),
        };

        for parameter in &self.parameters {
            match object.get(&parameter.name) {
                None | Some(JsonValue::Null) if parameter.required => {
                    return Err(self.invalid(format!(
                        "missing required argument '{}'",
                        parameter.name
                    )));
                }
                None | Some(JsonValue::Null) => {}
                Some(value) if !parameter.kind.matches(value) => {
                    return Err(self.invalid(format!(
                        "argument '{}' must be a {}",
                        parameter.name,
                        parameter.kind.json_type()
                    )));
                }
                Some(JsonValue::String(text)) if parameter.required && text.trim().is_empty() => {
                    return Err(self.invalid(format!(
                        "argument '{}' must not be blank",
                        parameter.name
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Converts to the declaration format sent to the model.
    #[must_use]
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ToolError {
        ToolError::InvalidArguments {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Ordered, read-only catalog of tool declarations.
///
/// Built once at start-up and shared behind an `Arc`; there is no way to
/// change it afterwards.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Builds a registry, keeping the given order.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTool` if two definitions share a name.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = ToolDefinition>,
    ) -> Result<Self, ToolError> {
        let mut registry = Self::default();
        for definition in definitions {
            if registry.get(&definition.name).is_some() {
                return Err(ToolError::DuplicateTool {
                    name: definition.name,
                });
            }
            registry.definitions.push(definition);
        }
        Ok(registry)
    }

    /// Gets a tool definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Returns all declarations in registration order.
    #[must_use]
    pub fn list(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Converts every declaration to the format sent to the model.
    #[must_use]
    pub fn to_llm_specs(&self) -> Vec<ToolSpec> {
        self.definitions.iter().map(ToolDefinition::to_spec).collect()
    }
}

/// Whether a tool invocation achieved what it was asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool did what was asked.
    Success,
    /// The tool could not do what was asked.
    Failure { reason: String },
}

/// Metadata about tool execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultMetadata {
    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Whether the tool modified shared state.
    pub has_side_effects: bool,
}

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The invocation this result answers.
    pub correlation_id: String,
    /// The tool that ran, or was asked for.
    pub tool_name: String,
    /// Success or failure.
    pub outcome: ToolOutcome,
    /// Payload the model reads.
    pub payload: JsonValue,
    /// The call should end once the current turn completes.
    pub ends_call: bool,
    /// Execution metadata.
    pub metadata: ToolResultMetadata,
}

impl ToolResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        correlation_id: impl Into<String>,
        tool_name: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Success,
            payload,
            ends_call: false,
            metadata: ToolResultMetadata::default(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(
        correlation_id: impl Into<String>,
        tool_name: impl Into<String>,
        reason: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            outcome: ToolOutcome::Failure {
                reason: reason.into(),
            },
            ..Self::success(correlation_id, tool_name, payload)
        }
    }

    /// Creates the failure result reported for a rejected invocation.
    #[must_use]
    pub fn from_error(invocation: &ToolInvocation, error: &ToolError) -> Self {
        let reason = error.to_string();
        let payload = serde_json::json!({ "status": "failed", "reason": reason });
        Self::failure(&invocation.id, &invocation.name, reason, payload)
    }

    /// Marks the result as asking for the call to end.
    #[must_use]
    pub fn ending_call(mut self) -> Self {
        self.ends_call = true;
        self
    }

    /// Adds metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: ToolResultMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Records how long the tool took.
    #[must_use]
    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.metadata.execution_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns true if the tool call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == ToolOutcome::Success
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            ToolOutcome::Success => None,
            ToolOutcome::Failure { reason } => Some(reason),
        }
    }

    /// Renders the payload as the tool message content.
    #[must_use]
    pub fn model_content(&self) -> String {
        self.payload.to_string()
    }
}

/// Runs tool invocations on behalf of the turn engine.
///
/// Implementations are shared by every concurrent call. `invoke` never
/// fails: unknown tools, bad arguments and execution errors come back as
/// failure results so the conversation can carry on.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Executes one invocation and reports its result.
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registration() -> ToolDefinition {
        ToolDefinition::new("register_for_event", "Register the caller")
            .with_parameter(ToolParameter::required(
                "full_name",
                ParameterKind::String,
                "The full name of the user",
            ))
            .with_parameter(ToolParameter::required(
                "phone_number",
                ParameterKind::String,
                "The phone number of the user",
            ))
            .with_parameter(ToolParameter::optional(
                "party_size",
                ParameterKind::Integer,
                "Number of attendees",
            ))
            .with_side_effects()
    }

    #[test]
    fn input_schema_lists_required_arguments() {
        let schema = registration().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["full_name"]["type"], "string");
        assert_eq!(schema["required"], json!(["full_name", "phone_number"]));
    }

    #[test]
    fn validation_accepts_complete_arguments() {
        let args = json!({"full_name": "Ada Lovelace", "phone_number": "+15550100"});
        assert!(registration().validate_arguments(&args).is_ok());
    }

    #[test]
    fn validation_rejects_missing_argument() {
        let args = json!({"full_name": "Ada Lovelace"});
        let err = registration()
            .validate_arguments(&args)
            .expect_err("should reject");
        assert_eq!(
            err,
            ToolError::InvalidArguments {
                name: "register_for_event".to_string(),
                reason: "missing required argument 'phone_number'".to_string(),
            }
        );
    }

    #[test]
    fn validation_rejects_wrong_type_and_blank() {
        let wrong_type = json!({"full_name": "Ada", "phone_number": 5550100});
        assert!(registration().validate_arguments(&wrong_type).is_err());

        let blank = json!({"full_name": "   ", "phone_number": "+15550100"});
        assert!(registration().validate_arguments(&blank).is_err());

        let bad_optional = json!({"full_name": "Ada", "phone_number": "1", "party_size": 1.5});
        assert!(registration().validate_arguments(&bad_optional).is_err());
    }

    #[test]
    fn validation_rejects_non_object() {
        let raw = JsonValue::String("{\"full_name\": \"Ada\"".to_string());
        assert!(registration().validate_arguments(&raw).is_err());
    }

    #[test]
    fn null_arguments_are_fine_without_parameters() {
        let hang_up = ToolDefinition::new("hang_up", "End the call");
        assert!(hang_up.validate_arguments(&JsonValue::Null).is_ok());
    }

    #[test]
    fn registry_keeps_order_and_rejects_duplicates() {
        let registry = ToolRegistry::from_definitions([
            ToolDefinition::new("hang_up", "End the call"),
            registration(),
        ])
        .expect("unique names");

        let names: Vec<_> = registry.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["hang_up", "register_for_event"]);
        assert!(registry.get("register_for_event").is_some());
        assert!(registry.get("transfer_call").is_none());
        assert_eq!(registry.to_llm_specs()[1].parameters["required"][0], "full_name");

        let err = ToolRegistry::from_definitions([
            ToolDefinition::new("hang_up", "End the call"),
            ToolDefinition::new("hang_up", "End it again"),
        ])
        .expect_err("duplicate");
        assert!(matches!(err, ToolError::DuplicateTool { .. }));
    }

    #[test]
    fn failure_result_from_error() {
        let invocation = ToolInvocation::new("call_9", "transfer_call", json!({}));
        let err = ToolError::UnknownTool {
            name: "transfer_call".to_string(),
        };
        let result = ToolResult::from_error(&invocation, &err);

        assert!(!result.is_success());
        assert_eq!(result.correlation_id, "call_9");
        assert_eq!(result.failure_reason(), Some("unknown tool: transfer_call"));
        assert_eq!(result.payload["status"], "failed");
        assert!(!result.ends_call);
    }

    #[test]
    fn execution_time_is_recorded() {
        let result = ToolResult::success("call_1", "hang_up", JsonValue::Null)
            .ending_call()
            .with_execution_time(Duration::from_millis(12));
        assert!(result.ends_call);
        assert_eq!(result.metadata.execution_time_ms, 12);
        assert_eq!(result.model_content(), "null");
    }
}
