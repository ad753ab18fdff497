//! Error types for the conversation crate.
//!
//! - `ToolError`: contract violations and failures while running a tool
//! - `SessionError`: misuse of a call session's state machine
//! - `GatewayError`: the telephony side stopped cooperating
//!
//! Tool errors never leave a turn: the dispatcher turns them into failure
//! results the model can read.

use callhandler_core::CallSessionId;
use std::fmt;

/// Errors from tool registration and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The model asked for a tool that is not registered.
    UnknownTool { name: String },
    /// Arguments are missing or have the wrong type.
    InvalidArguments { name: String, reason: String },
    /// Two declarations share a name.
    DuplicateTool { name: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool { name } => write!(f, "unknown tool: {name}"),
            Self::InvalidArguments { name, reason } => {
                write!(f, "invalid arguments for tool '{name}': {reason}")
            }
            Self::DuplicateTool { name } => write!(f, "tool '{name}' is already registered"),
        }
    }
}

impl std::error::Error for ToolError {}

/// Errors from call session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session has ended and accepts no further turns.
    Terminated { id: CallSessionId },
    /// Invalid session state transition.
    InvalidStateTransition { from: String, to: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated { id } => write!(f, "session {id} has terminated"),
            Self::InvalidStateTransition { from, to } => {
                write!(f, "invalid state transition from {from} to {to}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from the telephony gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The call is gone; nothing more can be delivered.
    Disconnected { call_sid: String },
    /// No reply arrived within the wait budget.
    ReplyTimedOut { call_sid: String, waited_ms: u64 },
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { call_sid } => write!(f, "call {call_sid} is disconnected"),
            Self::ReplyTimedOut {
                call_sid,
                waited_ms,
            } => write!(f, "no reply for call {call_sid} after {waited_ms}ms"),
        }
    }
}

impl std::error::Error for GatewayError {}
