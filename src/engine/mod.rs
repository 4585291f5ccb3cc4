//! Engine
//!
//! The [`Engine`] ties the room, publisher, player and mixer state machines
//! to a signaling transport and to the event dispatcher.

pub mod completion;
pub mod config;
mod context;
pub(crate) mod rate_limit;
pub(crate) mod state;

pub use completion::Completion;
pub use config::{EngineConfig, Scenario};
pub use context::{Engine, MAX_CAPTURE_VOLUME};
pub(crate) use state::EngineInput;
