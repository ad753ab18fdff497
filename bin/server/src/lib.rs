//! Twilio voice front end for callhandler.
//!
//! Webhooks start a worker per call and relay caller speech to it; replies
//! come back as TwiML.

pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod twiml;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway::CallDirectory;
use crate::routes::AppState;
use callhandler_ai::LlmBackend;
use callhandler_conversation::{CallRunner, TurnEngine};
use callhandler_events::{EventDispatcher, SlotPool, event_tool_registry};
use std::sync::Arc;

/// Wires the call handling stack around a model backend.
///
/// # Errors
///
/// Returns `Startup` if the tool registry cannot be built.
pub fn build_state(
    config: &ServerConfig,
    backend: Arc<dyn LlmBackend>,
) -> callhandler_core::Result<Arc<AppState>, ServerError> {
    let pool = Arc::new(SlotPool::from_config(config.event));
    let registry = Arc::new(event_tool_registry().map_err(|e| ServerError::Startup {
        component: "tool registry".to_string(),
        reason: e.to_string(),
    })?);
    let dispatcher = Arc::new(EventDispatcher::new(Arc::clone(&pool), Arc::clone(&registry)));
    let engine = TurnEngine::new(backend, registry, dispatcher, config.turn_config());
    let runner = CallRunner::new(engine, config.call.runner_config());

    Ok(Arc::new(AppState {
        directory: CallDirectory::new(runner, config.voice.closing.clone()),
        pool,
        voice: config.voice.clone(),
        base_path: config.base_path(),
        reply_timeout: config.call.reply_timeout(),
    }))
}
