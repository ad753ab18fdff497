//! Twilio voice webhooks and the health check.

use crate::config::VoiceConfig;
use crate::gateway::CallDirectory;
use crate::twiml::{Gather, Say, VoiceResponse};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use callhandler_conversation::{APOLOGY_REPLY, SessionReply};
use callhandler_events::SlotPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Statuses Twilio reports once a call is over.
const TERMINAL_STATUSES: [&str; 5] = ["completed", "busy", "failed", "no-answer", "canceled"];

/// Shared state for the webhook handlers.
#[derive(Debug)]
pub struct AppState {
    /// Running calls.
    pub directory: CallDirectory,
    /// The event's slot pool, for the health check.
    pub pool: Arc<SlotPool>,
    /// Spoken texts and voice settings.
    pub voice: VoiceConfig,
    /// Normalized webhook prefix.
    pub base_path: String,
    /// How long a webhook waits for the worker's reply.
    pub reply_timeout: Duration,
}

impl AppState {
    fn input_action(&self) -> String {
        format!("{}/input", self.base_path)
    }

    fn say(&self, text: impl Into<String>) -> Say {
        Say::new(&self.voice, text)
    }

    fn listen(&self) -> Gather {
        Gather::new(self.input_action(), self.voice.gather_timeout_secs)
    }

    fn render_reply(&self, reply: SessionReply) -> VoiceResponse {
        match reply {
            SessionReply::Continue { reply } => VoiceResponse::new()
                .say(self.say(reply))
                .pause(1)
                .gather(self.listen().say(self.say(&self.voice.follow_up))),
            SessionReply::Hangup { reply, closing } => {
                let response = match reply {
                    Some(reply) => VoiceResponse::new().say(self.say(reply)),
                    None => VoiceResponse::new(),
                };
                response.pause(1).say(self.say(closing)).hangup()
            }
        }
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let base = state.base_path.clone();
    Router::new()
        .route("/health", get(health))
        .route(&format!("{base}/answer"), post(answer))
        .route(&format!("{base}/input"), post(handle_input))
        .route(&format!("{base}/status"), post(call_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Form fields Twilio posts on call start and after each gather.
#[derive(Debug, Deserialize)]
pub struct VoiceWebhook {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "SpeechResult", default)]
    speech_result: Option<String>,
}

/// Form fields of Twilio's status callback.
#[derive(Debug, Deserialize)]
pub struct StatusWebhook {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "CallStatus")]
    call_status: String,
}

async fn answer(
    State(state): State<Arc<AppState>>,
    Form(webhook): Form<VoiceWebhook>,
) -> VoiceResponse {
    info!(call_sid = %webhook.call_sid, "incoming call");
    let _ = state.directory.start(&webhook.call_sid);

    VoiceResponse::new().gather(state.listen().say(state.say(&state.voice.greeting)))
}

async fn handle_input(
    State(state): State<Arc<AppState>>,
    Form(webhook): Form<VoiceWebhook>,
) -> VoiceResponse {
    if let Some(last) = state.directory.ended(&webhook.call_sid) {
        info!(call_sid = %webhook.call_sid, "input for a call that already ended");
        return state.render_reply(last);
    }

    let handle = match state.directory.get(&webhook.call_sid) {
        Some(handle) => handle,
        None => {
            info!(call_sid = %webhook.call_sid, "input for unknown call; starting session");
            state.directory.start(&webhook.call_sid)
        }
    };

    let speech = webhook.speech_result.unwrap_or_default();
    match handle.submit(speech, state.reply_timeout).await {
        Ok(reply) => state.render_reply(reply),
        Err(report) => match state.directory.ended(&webhook.call_sid) {
            Some(last) => state.render_reply(last),
            None => {
                warn!(call_sid = %webhook.call_sid, error = %report, "no reply from call worker");
                VoiceResponse::new()
                    .say(state.say(APOLOGY_REPLY))
                    .gather(state.listen().say(state.say(&state.voice.follow_up)))
            }
        },
    }
}

async fn call_status(
    State(state): State<Arc<AppState>>,
    Form(webhook): Form<StatusWebhook>,
) -> StatusCode {
    if TERMINAL_STATUSES.contains(&webhook.call_status.as_str()) {
        let known = state.directory.hang_up(&webhook.call_sid);
        info!(
            call_sid = %webhook.call_sid,
            status = %webhook.call_status,
            known,
            "call ended"
        );
    }
    StatusCode::NO_CONTENT
}

/// Body of the health check.
#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    /// Always `ok` while the process serves requests.
    pub status: String,
    /// Calls with a running worker.
    pub active_calls: usize,
    /// Slots left in the pool.
    pub open_slots: u32,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(Health {
        status: "ok".to_string(),
        active_calls: state.directory.active_calls(),
        open_slots: state.pool.availability(),
    })
}
