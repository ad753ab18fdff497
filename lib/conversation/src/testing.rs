//! Scripted fakes shared by the unit tests.

use crate::error::GatewayError;
use crate::runner::{GatewayEvent, TelephonyGateway};
use crate::session::SessionReply;
use crate::tool::{
    ParameterKind, ToolDefinition, ToolDispatcher, ToolParameter, ToolRegistry, ToolResult,
};
use async_trait::async_trait;
use callhandler_ai::{LlmBackend, LlmError, LlmProvider, LlmRequest, LlmResponse, ToolInvocation};
use rootcause::Report;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) fn registry() -> ToolRegistry {
    ToolRegistry::from_definitions([
        ToolDefinition::new("hang_up", "End the call"),
        ToolDefinition::new("check_event_availability", "Count open slots"),
        ToolDefinition::new("register_for_event", "Register the caller")
            .with_parameter(ToolParameter::required(
                "full_name",
                ParameterKind::String,
                "Full name",
            ))
            .with_parameter(ToolParameter::required(
                "phone_number",
                ParameterKind::String,
                "Phone number",
            )),
    ])
    .expect("unique tool names")
}

/// Backend answering from a fixed script.
pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub(crate) fn new(script: impl IntoIterator<Item = Result<LlmResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, Report<LlmError>> {
        self.requests.lock().expect("lock").push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().expect("lock").pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(err)) => Err(err.into()),
            None => Err(LlmError::RequestFailed {
                reason: "script exhausted".to_string(),
            }
            .into()),
        }
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::OpenAiCompatible
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Dispatcher with canned results per tool name.
#[derive(Default)]
pub(crate) struct StubDispatcher {
    invoked: Mutex<Vec<String>>,
}

impl StubDispatcher {
    pub(crate) fn invoked(&self) -> Vec<String> {
        self.invoked.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ToolDispatcher for StubDispatcher {
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolResult {
        self.invoked
            .lock()
            .expect("lock")
            .push(invocation.name.clone());
        match invocation.name.as_str() {
            "hang_up" => {
                ToolResult::success(&invocation.id, "hang_up", serde_json::Value::Null)
                    .ending_call()
            }
            "check_event_availability" => ToolResult::success(
                &invocation.id,
                "check_event_availability",
                json!({"open_slot_count": 3}),
            ),
            name => ToolResult::success(&invocation.id, name, json!({"status": "success"})),
        }
    }
}

/// Gateway fed from a queue of events.
///
/// Once the queue is empty, `next_event` waits forever so input timeouts
/// can be exercised.
pub(crate) struct ScriptedGateway {
    events: VecDeque<GatewayEvent>,
    spoken: Arc<Mutex<Vec<SessionReply>>>,
    token: CancellationToken,
    cancel_after_utterances: Option<usize>,
}

impl ScriptedGateway {
    pub(crate) fn new(events: impl IntoIterator<Item = GatewayEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            spoken: Arc::default(),
            token: CancellationToken::new(),
            cancel_after_utterances: None,
        }
    }

    /// Cancels the disconnect token once this many utterances were handed out.
    pub(crate) fn disconnect_after(mut self, utterances: usize) -> Self {
        self.cancel_after_utterances = Some(utterances);
        self
    }

    pub(crate) fn spoken(&self) -> Arc<Mutex<Vec<SessionReply>>> {
        Arc::clone(&self.spoken)
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[async_trait]
impl TelephonyGateway for ScriptedGateway {
    async fn next_event(&mut self) -> GatewayEvent {
        match self.events.pop_front() {
            Some(event) => {
                if let Some(remaining) = self.cancel_after_utterances.as_mut() {
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 {
                        self.token.cancel();
                    }
                }
                event
            }
            None => std::future::pending().await,
        }
    }

    async fn speak(&mut self, reply: &SessionReply) -> Result<(), Report<GatewayError>> {
        self.spoken.lock().expect("lock").push(reply.clone());
        Ok(())
    }

    fn disconnect_token(&self) -> CancellationToken {
        self.token.clone()
    }
}
