//! Event dispatch
//!
//! The engine reports everything asynchronously: state transitions,
//! membership deltas, quality snapshots, IM, relay states. This module owns
//! the observer list and the single ordered delivery task.
//!
//! # Ordering
//!
//! - One queue for the whole engine, so events for a room, channel or stream
//!   arrive in the order the state machines produced them. A room's
//!   `Connected` is delivered before its snapshot; a channel's `Publishing`
//!   before its first captured frame.
//! - For each event, observers are called in registration order.
//! - An observer removed during a callback receives nothing further, and the
//!   observers after it still receive the current event.

pub(crate) mod dispatcher;
pub mod channel;
pub mod event;
pub mod handler;

pub use channel::EventChannel;
pub use event::{Event, ExtendedData, UpdateType};
pub use handler::EventHandler;
