//! Webhook-backed telephony gateway.
//!
//! Twilio talks to us one HTTP request at a time, while each call is driven
//! by its own long-lived worker. A webhook pushes the caller's speech into
//! the worker's channel together with a oneshot sender and waits on the
//! receiver for the reply.
//!
//! A reply nobody is waiting for is held and spoken ahead of the next one.
//! Once a worker ends its call, the directory keeps the final reply so late
//! webhooks for that call get the goodbye instead of a fresh session.

use async_trait::async_trait;
use callhandler_conversation::{
    CallRunner, CallSession, GatewayError, GatewayEvent, SessionReply, TelephonyGateway,
};
use callhandler_core::CallSessionId;
use rootcause::Report;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const INBOUND_CAPACITY: usize = 8;

/// One caller utterance waiting for its reply.
#[derive(Debug)]
pub struct Inbound {
    text: String,
    reply_to: oneshot::Sender<SessionReply>,
}

/// The worker side of a call's channel.
#[derive(Debug)]
pub struct ChannelGateway {
    call_sid: String,
    inbound: mpsc::Receiver<Inbound>,
    pending: Option<oneshot::Sender<SessionReply>>,
    held: Option<SessionReply>,
    disconnected: CancellationToken,
}

impl ChannelGateway {
    /// Answers every webhook still waiting on this call with `last` and
    /// stops accepting new ones.
    fn settle(&mut self, last: &SessionReply) {
        self.inbound.close();
        if let Some(reply_to) = self.pending.take() {
            let _ = reply_to.send(last.clone());
        }
        while let Ok(Inbound { reply_to, .. }) = self.inbound.try_recv() {
            let _ = reply_to.send(last.clone());
        }
    }
}

#[async_trait]
impl TelephonyGateway for ChannelGateway {
    async fn next_event(&mut self) -> GatewayEvent {
        match self.inbound.recv().await {
            Some(Inbound { text, reply_to }) => {
                self.pending = Some(reply_to);
                GatewayEvent::Utterance(text)
            }
            None => GatewayEvent::Disconnected,
        }
    }

    async fn speak(&mut self, reply: &SessionReply) -> Result<(), Report<GatewayError>> {
        let reply = match self.held.take() {
            Some(held) => held.followed_by(reply.clone()),
            None => reply.clone(),
        };
        let Some(reply_to) = self.pending.take() else {
            debug!(call_sid = %self.call_sid, "no webhook waiting; holding reply");
            self.held = Some(reply);
            return Ok(());
        };
        if let Err(reply) = reply_to.send(reply) {
            // The webhook gave up waiting. The call itself is still up.
            warn!(call_sid = %self.call_sid, "webhook stopped waiting; holding reply");
            self.held = Some(reply);
        }
        Ok(())
    }

    fn disconnect_token(&self) -> CancellationToken {
        self.disconnected.clone()
    }
}

/// The webhook side of a call's channel.
#[derive(Debug, Clone)]
pub struct CallHandle {
    call_sid: String,
    session_id: CallSessionId,
    inbound: mpsc::Sender<Inbound>,
    disconnected: CancellationToken,
}

impl CallHandle {
    /// Returns the session id of the worker behind this handle.
    #[must_use]
    pub fn session_id(&self) -> CallSessionId {
        self.session_id
    }

    /// Sends an utterance to the worker and waits for the reply.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if the worker is gone and `ReplyTimedOut` if
    /// the reply takes longer than `wait`.
    pub async fn submit(
        &self,
        text: impl Into<String>,
        wait: Duration,
    ) -> Result<SessionReply, Report<GatewayError>> {
        let (reply_to, reply) = oneshot::channel();
        let disconnected = || GatewayError::Disconnected {
            call_sid: self.call_sid.clone(),
        };

        self.inbound
            .send(Inbound {
                text: text.into(),
                reply_to,
            })
            .await
            .map_err(|_| disconnected())?;

        match tokio::time::timeout(wait, reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(disconnected().into()),
            Err(_) => Err(GatewayError::ReplyTimedOut {
                call_sid: self.call_sid.clone(),
                waited_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            }
            .into()),
        }
    }
}

#[derive(Debug, Default)]
struct Calls {
    active: HashMap<String, CallHandle>,
    ended: HashMap<String, SessionReply>,
}

/// Calls by Twilio `CallSid`: running ones, and ones whose worker ended the
/// call before Twilio reported it over.
#[derive(Debug, Clone)]
pub struct CallDirectory {
    calls: Arc<Mutex<Calls>>,
    runner: CallRunner,
    closing: String,
}

impl CallDirectory {
    /// Creates an empty directory whose workers use `runner`.
    #[must_use]
    pub fn new(runner: CallRunner, closing: impl Into<String>) -> Self {
        Self {
            calls: Arc::default(),
            runner,
            closing: closing.into(),
        }
    }

    /// Returns the handle for a call, starting a worker if there is none.
    #[must_use]
    pub fn start(&self, call_sid: &str) -> CallHandle {
        let mut calls = lock(&self.calls);
        if let Some(handle) = calls.active.get(call_sid) {
            return handle.clone();
        }

        let (sender, receiver) = mpsc::channel(INBOUND_CAPACITY);
        let disconnected = CancellationToken::new();
        let session = CallSession::new(call_sid, self.closing.clone());
        let handle = CallHandle {
            call_sid: call_sid.to_string(),
            session_id: session.id(),
            inbound: sender,
            disconnected: disconnected.clone(),
        };
        let gateway = ChannelGateway {
            call_sid: call_sid.to_string(),
            inbound: receiver,
            pending: None,
            held: None,
            disconnected,
        };

        info!(call_sid, session_id = %handle.session_id, "starting call worker");
        let runner = self.runner.clone();
        let directory = Arc::clone(&self.calls);
        let sid = call_sid.to_string();
        let session_id = handle.session_id;
        let goodbye = SessionReply::Hangup {
            reply: None,
            closing: self.closing.clone(),
        };
        tokio::spawn(async move {
            let mut gateway = gateway;
            runner.run(session, &mut gateway).await;

            let last = match gateway.held.take() {
                Some(held) => held.followed_by(goodbye),
                None => goodbye,
            };
            {
                let mut calls = lock(&directory);
                if calls
                    .active
                    .get(&sid)
                    .is_some_and(|h| h.session_id == session_id)
                {
                    calls.active.remove(&sid);
                    calls.ended.insert(sid, last.clone());
                }
            }
            gateway.settle(&last);
        });

        calls.active.insert(call_sid.to_string(), handle.clone());
        handle
    }

    /// Returns the handle for a running call.
    #[must_use]
    pub fn get(&self, call_sid: &str) -> Option<CallHandle> {
        lock(&self.calls).active.get(call_sid).cloned()
    }

    /// Returns the final reply of a call whose worker has already ended it.
    #[must_use]
    pub fn ended(&self, call_sid: &str) -> Option<SessionReply> {
        lock(&self.calls).ended.get(call_sid).cloned()
    }

    /// Signals that the caller hung up and forgets the call. Returns false
    /// if the call was not known.
    pub fn hang_up(&self, call_sid: &str) -> bool {
        let mut calls = lock(&self.calls);
        let ended = calls.ended.remove(call_sid).is_some();
        let Some(handle) = calls.active.remove(call_sid) else {
            return ended;
        };
        info!(call_sid, session_id = %handle.session_id, "caller hung up");
        handle.disconnected.cancel();
        true
    }

    /// Returns the number of running calls.
    #[must_use]
    pub fn active_calls(&self) -> usize {
        lock(&self.calls).active.len()
    }
}

fn lock(calls: &Mutex<Calls>) -> MutexGuard<'_, Calls> {
    calls.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use callhandler_ai::{
        LlmBackend, LlmError, LlmProvider, LlmRequest, LlmResponse, ToolInvocation,
    };
    use callhandler_conversation::{RunnerConfig, ToolRegistry, TurnConfig, TurnEngine};
    use callhandler_events::{EventDispatcher, SlotPool, event_tool_registry};
    use std::collections::VecDeque;

    struct Echo;

    #[async_trait]
    impl LlmBackend for Echo {
        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, Report<LlmError>> {
            let said = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(LlmResponse::reply(format!("You said: {said}")))
        }

        fn provider(&self) -> LlmProvider {
            LlmProvider::OpenAiCompatible
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    /// Answers each request after its own delay.
    struct Paced(Mutex<VecDeque<(Duration, LlmResponse)>>);

    impl Paced {
        fn new(steps: impl IntoIterator<Item = (Duration, LlmResponse)>) -> Self {
            Self(Mutex::new(steps.into_iter().collect()))
        }
    }

    #[async_trait]
    impl LlmBackend for Paced {
        async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, Report<LlmError>> {
            let step = self.0.lock().expect("lock").pop_front();
            let (delay, response) = step.ok_or(LlmError::Timeout)?;
            tokio::time::sleep(delay).await;
            Ok(response)
        }

        fn provider(&self) -> LlmProvider {
            LlmProvider::OpenAiCompatible
        }

        fn model(&self) -> &str {
            "paced"
        }
    }

    fn directory_with(backend: Arc<dyn LlmBackend>, registry: ToolRegistry) -> CallDirectory {
        let registry = Arc::new(registry);
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::new(SlotPool::new(0)),
            Arc::clone(&registry),
        ));
        let engine = TurnEngine::new(backend, registry, dispatcher, TurnConfig::default());
        CallDirectory::new(
            CallRunner::new(engine, RunnerConfig::default()),
            "Goodbye!",
        )
    }

    fn directory() -> CallDirectory {
        directory_with(Arc::new(Echo), ToolRegistry::default())
    }

    fn hang_up() -> LlmResponse {
        LlmResponse::tool_requests(vec![ToolInvocation::new(
            "call_1",
            "hang_up",
            serde_json::json!({}),
        )])
    }

    fn goodbye() -> SessionReply {
        SessionReply::Hangup {
            reply: None,
            closing: "Goodbye!".to_string(),
        }
    }

    #[tokio::test]
    async fn submit_returns_worker_reply() {
        let directory = directory();
        let handle = directory.start("CA1");

        let reply = handle
            .submit("hello", Duration::from_secs(1))
            .await
            .expect("reply");

        assert_eq!(reply.reply(), Some("You said: hello"));
        assert_eq!(directory.active_calls(), 1);
    }

    #[tokio::test]
    async fn start_is_idempotent_per_call() {
        let directory = directory();
        let first = directory.start("CA1");
        let second = directory.start("CA1");

        assert_eq!(first.session_id(), second.session_id());
        assert_eq!(directory.active_calls(), 1);
    }

    #[tokio::test]
    async fn hang_up_stops_worker() {
        let directory = directory();
        let handle = directory.start("CA1");

        assert!(directory.hang_up("CA1"));
        assert!(!directory.hang_up("CA1"));
        assert_eq!(directory.active_calls(), 0);

        // Give the worker a moment to observe the cancellation and exit.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = handle
            .submit("anyone there?", Duration::from_millis(200))
            .await
            .expect_err("worker is gone");
        assert!(err.to_string().contains("call CA1 is disconnected"));
    }

    #[tokio::test]
    async fn late_hang_up_is_kept_for_the_call() {
        let directory = directory_with(
            Arc::new(Paced::new([(Duration::from_millis(300), hang_up())])),
            event_tool_registry().expect("registry"),
        );
        let handle = directory.start("CA1");

        let err = handle
            .submit("Thanks, bye", Duration::from_millis(100))
            .await
            .expect_err("reply is late");
        assert!(err.to_string().contains("no reply for call CA1"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(directory.active_calls(), 0);
        assert!(directory.get("CA1").is_none());
        assert_eq!(directory.ended("CA1"), Some(goodbye()));

        assert!(directory.hang_up("CA1"));
        assert_eq!(directory.ended("CA1"), None);
    }

    #[tokio::test]
    async fn late_reply_is_spoken_with_the_next_one() {
        let directory = directory_with(
            Arc::new(Paced::new([
                (
                    Duration::from_millis(300),
                    LlmResponse::reply("The event is on Friday."),
                ),
                (Duration::ZERO, LlmResponse::reply("You're welcome.")),
            ])),
            event_tool_registry().expect("registry"),
        );
        let handle = directory.start("CA1");

        handle
            .submit("When is the event?", Duration::from_millis(100))
            .await
            .expect_err("reply is late");
        tokio::time::sleep(Duration::from_millis(400)).await;

        let reply = handle
            .submit("Thanks", Duration::from_secs(1))
            .await
            .expect("reply");
        assert_eq!(
            reply,
            SessionReply::Continue {
                reply: "The event is on Friday. You're welcome.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn queued_webhook_gets_goodbye_when_call_ends() {
        let directory = directory_with(
            Arc::new(Paced::new([(Duration::from_millis(200), hang_up())])),
            event_tool_registry().expect("registry"),
        );
        let handle = directory.start("CA1");

        handle
            .submit("Thanks, bye", Duration::from_millis(50))
            .await
            .expect_err("reply is late");
        let reply = handle
            .submit("Hello?", Duration::from_secs(1))
            .await
            .expect("reply");

        assert_eq!(reply, goodbye());
        assert_eq!(directory.active_calls(), 0);
    }
}
