//! Centralized server configuration.
//!
//! Loaded once at start-up via the `config` crate from environment
//! variables, with `__` separating nested sections (`LLM__MODEL`,
//! `CALL__MAX_TOOL_ROUNDS`, ...).

use callhandler_ai::LlmBackendConfig;
use callhandler_conversation::{RunnerConfig, TurnConfig};
use callhandler_events::SlotPoolConfig;
use serde::Deserialize;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Prefix of the webhook routes, as Twilio sees them.
    #[serde(default = "default_public_base_path")]
    pub public_base_path: String,

    /// Language model settings.
    pub llm: LlmConfig,

    /// Event slot pool.
    #[serde(default)]
    pub event: SlotPoolConfig,

    /// Per-call limits.
    #[serde(default)]
    pub call: CallConfig,

    /// Spoken texts and voice settings.
    #[serde(default)]
    pub voice: VoiceConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_public_base_path() -> String {
    "/voice".to_string()
}

/// Language model settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// API key for the model service.
    pub api_key: String,

    /// Chat completions base URL.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Cap on reply tokens.
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Wait budget for one model request, in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_temperature() -> f32 {
    0.7
}

fn default_llm_max_tokens() -> u32 {
    100
}

fn default_llm_timeout_secs() -> u64 {
    10
}

impl LlmConfig {
    /// Returns the backend configuration.
    #[must_use]
    pub fn backend_config(&self) -> LlmBackendConfig {
        LlmBackendConfig::openai(&self.api_key, &self.model)
            .with_base_url(&self.base_url)
            .with_timeout_secs(self.timeout_secs)
    }
}

/// Per-call limits.
#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    /// Tool batches allowed per turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Messages of history sent to the model.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Seconds to wait for caller input before treating it as silence.
    #[serde(default = "default_input_timeout_secs")]
    pub input_timeout_secs: u64,

    /// Consecutive silent waits before the call is ended.
    #[serde(default = "default_max_silent_timeouts")]
    pub max_silent_timeouts: u32,

    /// Seconds a webhook waits for the worker's reply.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,

    /// Seconds all model requests of one turn may take together. Should
    /// stay below `reply_timeout_secs` so replies reach the webhook.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

fn default_max_tool_rounds() -> u32 {
    4
}

fn default_history_window() -> usize {
    40
}

fn default_input_timeout_secs() -> u64 {
    30
}

fn default_max_silent_timeouts() -> u32 {
    3
}

fn default_reply_timeout_secs() -> u64 {
    12
}

fn default_turn_timeout_secs() -> u64 {
    10
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            history_window: default_history_window(),
            input_timeout_secs: default_input_timeout_secs(),
            max_silent_timeouts: default_max_silent_timeouts(),
            reply_timeout_secs: default_reply_timeout_secs(),
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

impl CallConfig {
    /// Returns how long a webhook waits for a reply.
    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    /// Returns true if a turn that uses its whole budget still answers the
    /// webhook that started it.
    #[must_use]
    pub fn turn_fits_reply_window(&self) -> bool {
        self.turn_timeout_secs < self.reply_timeout_secs
    }

    /// Returns the worker loop settings.
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            input_timeout: Duration::from_secs(self.input_timeout_secs),
            max_silent_timeouts: self.max_silent_timeouts,
        }
    }
}

/// Spoken texts and voice settings.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Text-to-speech voice.
    #[serde(default = "default_voice")]
    pub voice: String,

    /// First prompt of every call.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Re-prompt after each reply.
    #[serde(default = "default_follow_up")]
    pub follow_up: String,

    /// Spoken right before the call is hung up.
    #[serde(default = "default_closing")]
    pub closing: String,

    /// Seconds of silence before a gather gives up.
    #[serde(default = "default_gather_timeout_secs")]
    pub gather_timeout_secs: u32,

    /// SSML prosody rate.
    #[serde(default = "default_speech_rate")]
    pub speech_rate: String,

    /// SSML prosody pitch.
    #[serde(default = "default_speech_pitch")]
    pub speech_pitch: String,
}

fn default_voice() -> String {
    "Google.en-US-Neural2-F".to_string()
}

fn default_greeting() -> String {
    "Welcome! How can I help you today?".to_string()
}

fn default_follow_up() -> String {
    "Is there anything else I can help you with?".to_string()
}

fn default_closing() -> String {
    "Thank you for calling. Goodbye!".to_string()
}

fn default_gather_timeout_secs() -> u32 {
    3
}

fn default_speech_rate() -> String {
    "95%".to_string()
}

fn default_speech_pitch() -> String {
    "-2%".to_string()
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            greeting: default_greeting(),
            follow_up: default_follow_up(),
            closing: default_closing(),
            gather_timeout_secs: default_gather_timeout_secs(),
            speech_rate: default_speech_rate(),
            speech_pitch: default_speech_pitch(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the webhook prefix with one leading slash and no trailing one.
    ///
    /// The root prefix comes back empty.
    #[must_use]
    pub fn base_path(&self) -> String {
        normalize_base_path(&self.public_base_path)
    }

    /// Returns the turn engine settings.
    #[must_use]
    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            max_tool_rounds: self.call.max_tool_rounds,
            model_timeout: Duration::from_secs(self.llm.timeout_secs),
            turn_timeout: Some(Duration::from_secs(self.call.turn_timeout_secs)),
            history_window: self.call.history_window,
            temperature: Some(self.llm.temperature),
            max_tokens: Some(self.llm.max_tokens),
            ..TurnConfig::default()
        }
    }
}

pub(crate) fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
