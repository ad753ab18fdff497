//! Conversation handling for phone calls.
//!
//! This crate provides:
//!
//! - **Tool Registry**: declarations the model may invoke, plus the
//!   dispatch contract
//! - **Turn Engine**: one caller utterance in, one reply out, tool rounds
//!   in between
//! - **Call Session**: per-call state machine and history
//! - **Call Runner**: the per-call worker loop over a telephony gateway

pub mod engine;
pub mod error;
pub mod marker;
pub mod message;
pub mod prompt;
pub mod runner;
pub mod session;
pub mod tool;

#[cfg(test)]
mod testing;

pub use engine::{
    APOLOGY_REPLY, REPEAT_REPLY, TurnConfig, TurnDegradation, TurnEnd, TurnEngine, TurnOutcome,
};
pub use error::{GatewayError, SessionError, ToolError};
pub use marker::{END_CONVERSATION_MARKER, ParsedReply, parse_reply};
pub use message::{History, Message, MessageRole};
pub use prompt::{SILENCE_INSTRUCTION, SystemPrompt};
pub use runner::{CallRunner, GatewayEvent, RunnerConfig, TelephonyGateway};
pub use session::{CallSession, SessionReply, SessionState, TerminationReason};
pub use tool::{
    ParameterKind, ToolDefinition, ToolDispatcher, ToolOutcome, ToolParameter, ToolRegistry,
    ToolResult, ToolResultMetadata,
};
