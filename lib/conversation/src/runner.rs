//! Per-call worker loop.
//!
//! [`CallRunner::run`] owns a session for the lifetime of one call: it pulls
//! caller input from a [`TelephonyGateway`], runs turns, and hands replies
//! back. A disconnect observed mid-turn drops the in-flight turn; tool
//! effects that already happened, such as a granted reservation, stay.

use crate::engine::TurnEngine;
use crate::error::GatewayError;
use crate::session::{CallSession, SessionReply, TerminationReason};
use async_trait::async_trait;
use chrono::Utc;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Something the telephony side reports for a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Transcribed caller speech; may be empty.
    Utterance(String),
    /// The caller hung up or the line dropped.
    Disconnected,
}

/// Speech in, replies out, for one call.
#[async_trait]
pub trait TelephonyGateway: Send {
    /// Waits for the next caller event.
    async fn next_event(&mut self) -> GatewayEvent;

    /// Delivers a reply to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the call can no longer be reached.
    async fn speak(&mut self, reply: &SessionReply) -> Result<(), Report<GatewayError>>;

    /// Token cancelled as soon as the caller disconnects.
    fn disconnect_token(&self) -> CancellationToken;
}

/// Worker loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How long to wait for caller input before treating it as silence.
    pub input_timeout: Duration,
    /// Consecutive silent timeouts tolerated before the call is ended.
    pub max_silent_timeouts: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            input_timeout: Duration::from_secs(30),
            max_silent_timeouts: 3,
        }
    }
}

enum Input {
    Event(GatewayEvent),
    TimedOut,
}

/// Drives one call from first input to termination.
#[derive(Debug, Clone)]
pub struct CallRunner {
    engine: TurnEngine,
    config: RunnerConfig,
}

impl CallRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(engine: TurnEngine, config: RunnerConfig) -> Self {
        Self { engine, config }
    }

    /// Runs the call until the session terminates and returns the final
    /// session.
    ///
    /// The gateway is borrowed so the caller can settle whatever it still
    /// holds once the worker is done.
    #[instrument(skip_all, fields(session_id = %session.id(), call_sid = %session.call_sid()))]
    pub async fn run<G: TelephonyGateway>(
        &self,
        mut session: CallSession,
        gateway: &mut G,
    ) -> CallSession {
        let disconnected = gateway.disconnect_token();
        let mut silent_timeouts = 0;
        info!("call worker started");

        while !session.state().is_terminated() {
            let input = tokio::select! {
                biased;
                () = disconnected.cancelled() => Input::Event(GatewayEvent::Disconnected),
                waited = tokio::time::timeout(self.config.input_timeout, gateway.next_event()) => {
                    match waited {
                        Ok(event) => Input::Event(event),
                        Err(_) => Input::TimedOut,
                    }
                }
            };

            let utterance = match input {
                Input::Event(GatewayEvent::Disconnected) => {
                    session.terminate(TerminationReason::CallerHungUp);
                    break;
                }
                Input::Event(GatewayEvent::Utterance(text)) => {
                    silent_timeouts = 0;
                    text
                }
                Input::TimedOut => {
                    silent_timeouts += 1;
                    debug!(silent_timeouts, "no caller input");
                    if silent_timeouts >= self.config.max_silent_timeouts {
                        session.terminate(TerminationReason::SilenceTimeout);
                        break;
                    }
                    String::new()
                }
            };

            let turn = tokio::select! {
                biased;
                () = disconnected.cancelled() => None,
                reply = session.handle_utterance(&self.engine, &utterance) => Some(reply),
            };

            let reply = match turn {
                None => {
                    info!("caller disconnected mid-turn; discarding reply");
                    session.terminate(TerminationReason::CallerHungUp);
                    break;
                }
                Some(Ok(reply)) => reply,
                Some(Err(err)) => {
                    warn!(error = %err, "turn rejected");
                    break;
                }
            };

            if let Err(report) = gateway.speak(&reply).await {
                warn!(error = %report, "failed to deliver reply");
                session.terminate(TerminationReason::CallerHungUp);
            }
        }

        let now = Utc::now();
        info!(
            turns = session.turn_count(),
            reason = ?session.termination(),
            duration_secs = (now - session.created_at()).num_seconds(),
            idle_secs = (now - session.last_active_at()).num_seconds(),
            "call worker finished"
        );
        session
    }
}
