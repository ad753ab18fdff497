//! Call session state.
//!
//! A session is owned by exactly one call worker and lives from the first
//! webhook to the end of the call. Its history is never shared.

use crate::engine::{TurnEnd, TurnEngine};
use crate::error::SessionError;
use crate::message::History;
use callhandler_core::CallSessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// The state of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the caller to say something.
    AwaitingInput,
    /// A turn is running.
    Processing,
    /// The call has ended.
    Terminated,
}

impl SessionState {
    /// Returns true if the session has ended.
    #[must_use]
    pub fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Returns true if moving to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::AwaitingInput, Self::Processing)
                | (Self::Processing, Self::AwaitingInput)
                | (Self::AwaitingInput | Self::Processing, Self::Terminated)
        )
    }

    /// Returns the state name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting_input",
            Self::Processing => "processing",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The model invoked `hang_up`.
    ModelHangUp,
    /// The model appended the end marker.
    EndMarker,
    /// The caller hung up or the line dropped.
    CallerHungUp,
    /// The caller stayed silent too many times in a row.
    SilenceTimeout,
}

impl From<TurnEnd> for TerminationReason {
    fn from(end: TurnEnd) -> Self {
        match end {
            TurnEnd::HangUpTool => Self::ModelHangUp,
            TurnEnd::EndMarker => Self::EndMarker,
        }
    }
}

/// What the gateway should do after a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionReply {
    /// Speak the reply and listen again.
    Continue { reply: String },
    /// Speak the reply, if any, then the closing message, then end the call.
    Hangup {
        reply: Option<String>,
        closing: String,
    },
}

impl SessionReply {
    /// Returns true if the call ends after this reply.
    #[must_use]
    pub fn is_hangup(&self) -> bool {
        matches!(self, Self::Hangup { .. })
    }

    /// Returns the model's reply, if there is one to speak.
    #[must_use]
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Continue { reply } => Some(reply),
            Self::Hangup { reply, .. } => reply.as_deref(),
        }
    }

    /// Speaks this reply's text ahead of `next`, keeping `next`'s action.
    ///
    /// Used when a reply could not be delivered and has to ride along with
    /// the following one.
    #[must_use]
    pub fn followed_by(self, next: Self) -> Self {
        let earlier = match self {
            Self::Continue { reply } => reply,
            Self::Hangup { reply, .. } => reply.unwrap_or_default(),
        };
        if earlier.is_empty() {
            return next;
        }
        match next {
            Self::Continue { reply } => Self::Continue {
                reply: format!("{earlier} {reply}"),
            },
            Self::Hangup { reply, closing } => Self::Hangup {
                reply: Some(match reply {
                    Some(reply) => format!("{earlier} {reply}"),
                    None => earlier,
                }),
                closing,
            },
        }
    }
}

/// One phone call's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    id: CallSessionId,
    call_sid: String,
    state: SessionState,
    history: History,
    turn_count: u32,
    termination: Option<TerminationReason>,
    closing_message: String,
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

impl CallSession {
    /// Creates a session for the gateway's call identifier.
    #[must_use]
    pub fn new(call_sid: impl Into<String>, closing_message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: CallSessionId::new(),
            call_sid: call_sid.into(),
            state: SessionState::AwaitingInput,
            history: History::new(),
            turn_count: 0,
            termination: None,
            closing_message: closing_message.into(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> CallSessionId {
        self.id
    }

    /// Returns the gateway's call identifier.
    #[must_use]
    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the call history.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Returns the number of caller turns started.
    #[must_use]
    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    /// Returns why the call ended, once it has.
    #[must_use]
    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the last turn finished.
    #[must_use]
    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    /// Runs one caller turn.
    ///
    /// # Errors
    ///
    /// Returns `Terminated` once the call has ended, and
    /// `InvalidStateTransition` if a turn is already running.
    pub async fn handle_utterance(
        &mut self,
        engine: &TurnEngine,
        utterance: &str,
    ) -> Result<SessionReply, SessionError> {
        if self.state.is_terminated() {
            return Err(SessionError::Terminated { id: self.id });
        }
        self.transition(SessionState::Processing)?;
        self.turn_count += 1;

        let outcome = engine
            .run_turn(&mut self.history, utterance, self.turn_count)
            .await;
        self.last_active_at = Utc::now();

        match outcome.end {
            Some(end) => {
                self.terminate(end.into());
                let reply = (!outcome.reply.is_empty()).then_some(outcome.reply);
                Ok(SessionReply::Hangup {
                    reply,
                    closing: self.closing_message.clone(),
                })
            }
            None => {
                self.transition(SessionState::AwaitingInput)?;
                Ok(SessionReply::Continue {
                    reply: outcome.reply,
                })
            }
        }
    }

    /// Ends the session. The first reason recorded wins.
    pub fn terminate(&mut self, reason: TerminationReason) {
        if self.state.is_terminated() {
            debug!(session_id = %self.id, ?reason, "session already terminated");
            return;
        }
        info!(
            session_id = %self.id,
            ?reason,
            turns = self.turn_count,
            "call session terminated"
        );
        self.state = SessionState::Terminated;
        self.termination = Some(reason);
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}
