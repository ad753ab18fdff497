//! Event registration for callhandler.
//!
//! The slot pool, the tools the model uses to check and take slots, and
//! the dispatcher that runs them.

pub mod dispatcher;
pub mod pool;
pub mod tools;

pub use dispatcher::EventDispatcher;
pub use pool::{Reservation, SlotPool, SlotPoolConfig};
pub use tools::{EVENT_FULL_REASON, EventTool, event_tool_registry};
