//! The turn engine.
//!
//! One turn takes a caller utterance and produces the reply to speak. In
//! between, the model may ask for tools; each batch is executed and fed
//! back until the model answers in text or the round budget runs out.

use crate::marker::parse_reply;
use crate::message::{History, Message};
use crate::prompt::{SILENCE_INSTRUCTION, SystemPrompt};
use crate::tool::{ToolDispatcher, ToolRegistry};
use callhandler_ai::{LlmBackend, LlmRequest, LlmResponse, ModelOutput, ToolSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Spoken when the model cannot be reached or the turn goes wrong.
pub const APOLOGY_REPLY: &str =
    "I apologize, but I'm having trouble processing your request. Please try again.";

/// Spoken when the model answers with nothing.
pub const REPEAT_REPLY: &str = "Sorry, I didn't catch that. Could you say that again?";

/// Limits and texts for a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Tool batches allowed per turn before the turn degrades.
    pub max_tool_rounds: u32,
    /// Wait budget for one model request.
    pub model_timeout: Duration,
    /// Budget for every model request of a turn together. Unbounded when
    /// unset.
    pub turn_timeout: Option<Duration>,
    /// Messages of history sent to the model.
    pub history_window: usize,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Cap on generated tokens.
    pub max_tokens: Option<u32>,
    /// System prompt.
    pub prompt: SystemPrompt,
    /// Reply used when the turn degrades.
    pub apology: String,
    /// Reply used when the model says nothing.
    pub repeat: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 4,
            model_timeout: Duration::from_secs(10),
            turn_timeout: None,
            history_window: 40,
            temperature: Some(0.7),
            max_tokens: Some(100),
            prompt: SystemPrompt::default(),
            apology: APOLOGY_REPLY.to_string(),
            repeat: REPEAT_REPLY.to_string(),
        }
    }
}

/// Why a turn ended the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEnd {
    /// The model invoked a tool that ends the call.
    HangUpTool,
    /// The model appended the end marker on a follow-up turn.
    EndMarker,
}

/// Why a turn fell back to the apology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDegradation {
    /// The model failed or did not answer in time.
    ModelUnavailable,
    /// The model kept asking for tools past the round budget.
    ToolLoopExceeded,
}

/// Result of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// What to speak. Empty only when a tool ended the call.
    pub reply: String,
    /// Set when the call should end after this reply.
    pub end: Option<TurnEnd>,
    /// Set when the reply is the apology.
    pub degradation: Option<TurnDegradation>,
    /// Tool invocations executed during the turn.
    pub tool_invocations: u32,
}

impl TurnOutcome {
    /// Returns true if the call should end.
    #[must_use]
    pub fn terminates(&self) -> bool {
        self.end.is_some()
    }
}

/// Drives the model through one caller turn.
///
/// Cheap to clone; every call shares the same backend, registry and
/// dispatcher.
#[derive(Clone)]
pub struct TurnEngine {
    backend: Arc<dyn LlmBackend>,
    registry: Arc<ToolRegistry>,
    dispatcher: Arc<dyn ToolDispatcher>,
    config: TurnConfig,
}

impl std::fmt::Debug for TurnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnEngine")
            .field("model", &self.backend.model())
            .field("tools", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TurnEngine {
    /// Creates a new engine.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        registry: Arc<ToolRegistry>,
        dispatcher: Arc<dyn ToolDispatcher>,
        config: TurnConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            dispatcher,
            config,
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Runs one turn.
    ///
    /// `turn_number` counts caller turns from 1; the end marker is honoured
    /// from turn 2. An empty utterance is recorded as the silence
    /// instruction. Everything the turn produces is appended to `history`.
    #[instrument(skip_all, fields(turn = turn_number))]
    pub async fn run_turn(
        &self,
        history: &mut History,
        utterance: &str,
        turn_number: u32,
    ) -> TurnOutcome {
        let follow_up = turn_number > 1;
        let utterance = utterance.trim();
        if utterance.is_empty() {
            debug!("caller was silent");
            history.append(Message::caller(SILENCE_INSTRUCTION));
        } else {
            history.append(Message::caller(utterance));
        }

        let deadline = self.config.turn_timeout.map(|budget| Instant::now() + budget);
        let system = self.config.prompt.render(follow_up);
        let tools = self.registry.to_llm_specs();
        let mut tool_invocations = 0;

        for round in 0..=self.config.max_tool_rounds {
            let request = self.build_request(history, &system, &tools);
            let Some(response) = self.query(&request, deadline).await else {
                return self.degrade(history, TurnDegradation::ModelUnavailable, tool_invocations);
            };

            let calls = match response.output {
                ModelOutput::FinalReply(text) => {
                    return self.finish(history, &text, follow_up, tool_invocations);
                }
                ModelOutput::ToolRequests(calls) if calls.is_empty() => {
                    return self.finish(history, "", follow_up, tool_invocations);
                }
                ModelOutput::ToolRequests(calls) => calls,
            };

            if round == self.config.max_tool_rounds {
                break;
            }

            history.append(Message::assistant_tool_calls(calls.clone()));
            let mut hang_up = false;
            for call in &calls {
                debug!(tool = %call.name, correlation_id = %call.id, "invoking tool");
                let result = self.dispatcher.invoke(call).await;
                tool_invocations += 1;
                hang_up |= result.ends_call;
                history.append(Message::tool(result));
            }

            if hang_up {
                info!("model hung up the call");
                return TurnOutcome {
                    reply: String::new(),
                    end: Some(TurnEnd::HangUpTool),
                    degradation: None,
                    tool_invocations,
                };
            }
        }

        warn!(
            max_tool_rounds = self.config.max_tool_rounds,
            "model kept requesting tools"
        );
        self.degrade(history, TurnDegradation::ToolLoopExceeded, tool_invocations)
    }

    fn build_request(&self, history: &History, system: &str, tools: &[ToolSpec]) -> LlmRequest {
        let messages = history
            .window(self.config.history_window)
            .iter()
            .map(Message::to_llm)
            .collect();

        let mut request = LlmRequest::new(messages)
            .with_system(system)
            .with_tools(tools.to_vec());
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    async fn query(&self, request: &LlmRequest, deadline: Option<Instant>) -> Option<LlmResponse> {
        let wait = match deadline {
            Some(deadline) => self
                .config
                .model_timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.config.model_timeout,
        };
        if wait.is_zero() {
            warn!("turn budget spent before model request");
            return None;
        }

        match tokio::time::timeout(wait, self.backend.generate(request)).await {
            Ok(Ok(response)) => Some(response),
            Ok(Err(report)) => {
                warn!(error = %report, "model request failed");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "model request timed out"
                );
                None
            }
        }
    }

    fn finish(
        &self,
        history: &mut History,
        raw: &str,
        follow_up: bool,
        tool_invocations: u32,
    ) -> TurnOutcome {
        let parsed = parse_reply(raw, follow_up);
        let end = parsed.end_requested.then_some(TurnEnd::EndMarker);
        let reply = if parsed.text.is_empty() && end.is_none() {
            self.config.repeat.clone()
        } else {
            parsed.text
        };

        if !reply.is_empty() {
            history.append(Message::assistant(&reply));
        }
        if end.is_some() {
            info!("model ended the conversation");
        }

        TurnOutcome {
            reply,
            end,
            degradation: None,
            tool_invocations,
        }
    }

    fn degrade(
        &self,
        history: &mut History,
        degradation: TurnDegradation,
        tool_invocations: u32,
    ) -> TurnOutcome {
        history.append(Message::assistant(&self.config.apology));
        TurnOutcome {
            reply: self.config.apology.clone(),
            end: None,
            degradation: Some(degradation),
            tool_invocations,
        }
    }
}
