//! Language model boundary for callhandler.
//!
//! - [`LlmBackend`]: one request/response exchange with the model service
//! - [`ModelOutput`]: the model either replies or asks for tools to run
//! - [`OpenAiBackend`]: the chat completions implementation used in production

pub mod backend;
pub mod error;
pub mod openai;

pub use backend::{
    LlmBackend, LlmBackendConfig, LlmMessage, LlmProvider, LlmRequest, LlmResponse, MessageRole,
    ModelOutput, TokenUsage, ToolInvocation, ToolSpec,
};
pub use error::LlmError;
pub use openai::OpenAiBackend;
