//! TwiML rendering.
//!
//! Only the verbs the webhooks need: `<Say>`, `<Pause>`, `<Gather>` and
//! `<Hangup>`. Spoken text is XML-escaped and wrapped in SSML prosody.

use crate::config::VoiceConfig;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::fmt::Write as _;

/// A `<Say>` verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Say {
    text: String,
    voice: String,
    rate: String,
    pitch: String,
}

impl Say {
    /// Creates a `<Say>` using the configured voice.
    #[must_use]
    pub fn new(voice: &VoiceConfig, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.voice.clone(),
            rate: voice.speech_rate.clone(),
            pitch: voice.speech_pitch.clone(),
        }
    }

    fn render(&self, out: &mut String) {
        let _ = write!(
            out,
            r#"<Say voice="{}"><prosody rate="{}" pitch="{}">{}</prosody></Say>"#,
            escape(&self.voice),
            escape(&self.rate),
            escape(&self.pitch),
            escape(&self.text)
        );
    }
}

/// A speech `<Gather>` posting the transcript back to `action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gather {
    action: String,
    timeout_secs: u32,
    prompts: Vec<Say>,
}

impl Gather {
    /// Creates a gather with no prompt.
    #[must_use]
    pub fn new(action: impl Into<String>, timeout_secs: u32) -> Self {
        Self {
            action: action.into(),
            timeout_secs,
            prompts: Vec::new(),
        }
    }

    /// Adds a prompt spoken while listening.
    #[must_use]
    pub fn say(mut self, say: Say) -> Self {
        self.prompts.push(say);
        self
    }

    fn render(&self, out: &mut String) {
        let _ = write!(
            out,
            r#"<Gather input="speech" action="{}" method="POST" timeout="{}" actionOnEmptyResult="true">"#,
            escape(&self.action),
            self.timeout_secs
        );
        for prompt in &self.prompts {
            prompt.render(out);
        }
        out.push_str("</Gather>");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verb {
    Say(Say),
    Pause { length_secs: u32 },
    Gather(Gather),
    Hangup,
}

/// A `<Response>` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    /// Creates an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `<Say>`.
    #[must_use]
    pub fn say(mut self, say: Say) -> Self {
        self.verbs.push(Verb::Say(say));
        self
    }

    /// Appends a `<Pause>`.
    #[must_use]
    pub fn pause(mut self, length_secs: u32) -> Self {
        self.verbs.push(Verb::Pause { length_secs });
        self
    }

    /// Appends a `<Gather>`.
    #[must_use]
    pub fn gather(mut self, gather: Gather) -> Self {
        self.verbs.push(Verb::Gather(gather));
        self
    }

    /// Appends a `<Hangup>`.
    #[must_use]
    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    /// Renders the document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
        for verb in &self.verbs {
            match verb {
                Verb::Say(say) => say.render(&mut out),
                Verb::Pause { length_secs } => {
                    let _ = write!(out, r#"<Pause length="{length_secs}"/>"#);
                }
                Verb::Gather(gather) => gather.render(&mut out),
                Verb::Hangup => out.push_str("<Hangup/>"),
            }
        }
        out.push_str("</Response>");
        out
    }
}

impl IntoResponse for VoiceResponse {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "text/xml")], self.render()).into_response()
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
