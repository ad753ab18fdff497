//! Router tests driving the Twilio webhooks end to end.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use callhandler_ai::{
    LlmBackend, LlmError, LlmProvider, LlmRequest, LlmResponse, ToolInvocation,
};
use callhandler_events::SlotPoolConfig;
use callhandler_server::build_state;
use callhandler_server::config::{CallConfig, LlmConfig, ServerConfig, VoiceConfig};
use callhandler_server::routes::{Health, router};
use rootcause::Report;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Answers each model request in order, each after its own delay.
struct Script {
    steps: Mutex<VecDeque<(Duration, LlmResponse)>>,
}

impl Script {
    fn new(responses: impl IntoIterator<Item = LlmResponse>) -> Self {
        Self::paced(responses.into_iter().map(|r| (Duration::ZERO, r)))
    }

    fn paced(steps: impl IntoIterator<Item = (Duration, LlmResponse)>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self::paced([(delay, LlmResponse::reply("too late"))])
    }
}

#[async_trait]
impl LlmBackend for Script {
    async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, Report<LlmError>> {
        let step = self.steps.lock().expect("lock").pop_front();
        let Some((delay, response)) = step else {
            return Err(LlmError::Timeout.into());
        };
        tokio::time::sleep(delay).await;
        Ok(response)
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::OpenAiCompatible
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

fn config(open_slots: u32) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        public_base_path: "/voice".to_string(),
        llm: LlmConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://localhost:9".to_string(),
            model: "scripted".to_string(),
            temperature: 0.7,
            max_tokens: 100,
            timeout_secs: 5,
        },
        event: SlotPoolConfig {
            capacity: open_slots,
        },
        call: CallConfig {
            reply_timeout_secs: 1,
            ..CallConfig::default()
        },
        voice: VoiceConfig::default(),
    }
}

fn app(script: Script, open_slots: u32) -> Router {
    let state = build_state(&config(open_slots), Arc::new(script)).expect("state");
    router(state)
}

fn form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, String::from_utf8(bytes.to_vec()).expect("utf-8"))
}

async fn health(app: &Router) -> Health {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_str(&body).expect("health json")
}

#[tokio::test]
async fn answer_greets_inside_gather() {
    let app = app(Script::new([]), 1);

    let response = app
        .clone()
        .oneshot(form("/voice/answer", "CallSid=CA100&From=%2B15550100"))
        .await
        .expect("response");
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(&b"text/xml"[..])
    );

    let (status, body) = send(&app, form("/voice/answer", "CallSid=CA100")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"<Gather input="speech" action="/voice/input" method="POST" timeout="3""#));
    assert!(body.contains("Welcome! How can I help you today?"));
    assert_eq!(health(&app).await.active_calls, 1);
}

#[tokio::test]
async fn input_speaks_reply_and_listens_again() {
    let app = app(Script::new([LlmResponse::reply("We have an event on Friday.")]), 1);
    send(&app, form("/voice/answer", "CallSid=CA1")).await;

    let (status, body) = send(
        &app,
        form("/voice/input", "CallSid=CA1&SpeechResult=What+events+are+on%3F"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("We have an event on Friday.</prosody></Say><Pause length=\"1\"/><Gather"));
    assert!(body.contains("Is there anything else I can help you with?"));
    assert!(!body.contains("<Hangup/>"));
}

#[tokio::test]
async fn registration_takes_the_slot() {
    let app = app(
        Script::new([
            LlmResponse::tool_requests(vec![ToolInvocation::new(
                "call_1",
                "register_for_event",
                json!({ "full_name": "Ada Lovelace", "phone_number": "+15550100" }),
            )]),
            LlmResponse::reply("You're registered, Ada!"),
        ]),
        1,
    );

    let (_, body) = send(
        &app,
        form("/voice/input", "CallSid=CA2&SpeechResult=Register+Ada+Lovelace"),
    )
    .await;

    assert!(body.contains("You&apos;re registered, Ada!"));
    assert_eq!(health(&app).await.open_slots, 0);
}

#[tokio::test]
async fn hang_up_says_closing_and_hangs_up() {
    let app = app(
        Script::new([LlmResponse::tool_requests(vec![ToolInvocation::new(
            "call_1",
            "hang_up",
            json!({}),
        )])]),
        1,
    );
    send(&app, form("/voice/answer", "CallSid=CA3")).await;

    let (_, body) = send(
        &app,
        form("/voice/input", "CallSid=CA3&SpeechResult=That%27s+all"),
    )
    .await;

    assert!(body.contains("Thank you for calling. Goodbye!</prosody></Say><Hangup/>"));
    assert!(!body.contains("<Gather"));
}

#[tokio::test]
async fn slow_model_gets_apology_and_new_gather() {
    let app = app(Script::slow(Duration::from_secs(3)), 1);

    let (status, body) = send(
        &app,
        form("/voice/input", "CallSid=CA4&SpeechResult=Hello"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("I apologize, but I&apos;m having trouble processing your request."));
    assert!(body.contains("<Gather"));
}

fn hang_up() -> LlmResponse {
    LlmResponse::tool_requests(vec![ToolInvocation::new("call_1", "hang_up", json!({}))])
}

#[tokio::test]
async fn late_hang_up_ends_the_call_on_next_input() {
    let app = app(
        Script::paced([
            (Duration::from_millis(1500), hang_up()),
            (Duration::ZERO, LlmResponse::reply("Hi again, how can I help?")),
        ]),
        1,
    );
    send(&app, form("/voice/answer", "CallSid=CA7")).await;

    let (_, first) = send(&app, form("/voice/input", "CallSid=CA7&SpeechResult=Thanks+bye")).await;
    assert!(first.contains("I apologize"));
    assert!(first.contains("<Gather"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let (status, second) = send(&app, form("/voice/input", "CallSid=CA7&SpeechResult=Hello%3F")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(second.contains("Thank you for calling. Goodbye!</prosody></Say><Hangup/>"));
    assert!(!second.contains("Hi again"));
    assert!(!second.contains("<Gather"));
    assert_eq!(health(&app).await.active_calls, 0);

    let (status, _) = send(&app, form("/voice/status", "CallSid=CA7&CallStatus=completed")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn late_reply_is_spoken_on_next_input() {
    let app = app(
        Script::paced([
            (
                Duration::from_millis(1500),
                LlmResponse::reply("The event is on Friday."),
            ),
            (Duration::ZERO, LlmResponse::reply("You're welcome.")),
        ]),
        1,
    );
    send(&app, form("/voice/answer", "CallSid=CA8")).await;

    let (_, first) = send(
        &app,
        form("/voice/input", "CallSid=CA8&SpeechResult=When+is+the+event%3F"),
    )
    .await;
    assert!(first.contains("I apologize"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let (_, second) = send(&app, form("/voice/input", "CallSid=CA8&SpeechResult=Thanks")).await;

    assert!(second.contains("The event is on Friday. You&apos;re welcome.</prosody></Say>"));
    assert!(second.contains("<Gather"));
    assert!(!second.contains("<Hangup/>"));
}

#[tokio::test]
async fn completed_status_ends_the_call() {
    let app = app(Script::new([]), 1);
    send(&app, form("/voice/answer", "CallSid=CA5")).await;
    assert_eq!(health(&app).await.active_calls, 1);

    let (status, _) = send(
        &app,
        form("/voice/status", "CallSid=CA5&CallStatus=completed"),
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(health(&app).await.active_calls, 0);
}

#[tokio::test]
async fn in_progress_status_keeps_the_call() {
    let app = app(Script::new([]), 1);
    send(&app, form("/voice/answer", "CallSid=CA6")).await;

    send(
        &app,
        form("/voice/status", "CallSid=CA6&CallStatus=in-progress"),
    )
    .await;

    assert_eq!(health(&app).await.active_calls, 1);
}
