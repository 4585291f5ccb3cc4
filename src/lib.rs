//! Client-side session engine for real-time audio/video
//!
//! `rtc-session` implements the state machines a real-time communication
//! client runs on top of its signaling service:
//! - Room connection lifecycle with transparent reconnect
//! - Publish sessions per channel and play sessions per stream
//! - Server-side mixer tasks and CDN relay state
//! - In-room messaging
//! - Ordered event delivery to any number of observers
//!
//! Media capture, encoding and transport are outside the crate; the engine
//! talks to the service through the [`signaling::Signaling`] trait and
//! reports everything through [`dispatch::EventHandler`].
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtc_session::dispatch::EventHandler;
//! use rtc_session::engine::{Engine, EngineConfig};
//! use rtc_session::ids::{RoomId, User};
//! use rtc_session::publisher::{PublishChannel, PublisherState};
//! use rtc_session::room::{RoomConfig, RoomState};
//! use rtc_session::signaling::loopback::LoopbackServer;
//! use rtc_session::ErrorCode;
//!
//! struct Logger;
//!
//! impl EventHandler for Logger {
//!     fn on_room_state_update(
//!         &self,
//!         state: RoomState,
//!         error_code: ErrorCode,
//!         _extended_data: &rtc_session::dispatch::ExtendedData,
//!         room_id: &RoomId,
//!     ) {
//!         println!("{}: {:?} ({})", room_id, state, error_code);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> rtc_session::Result<()> {
//!     let server = LoopbackServer::new();
//!     let engine = Engine::new(EngineConfig::default(), server.connect())?;
//!
//!     let logger = Arc::new(Logger);
//!     engine.add_event_handler(&logger)?;
//!
//!     let room = engine.login_room("r1", User::with_id("u1")?, RoomConfig::default())?;
//!     room.start_publishing_stream("s1", PublishChannel::Main)?;
//!     assert_eq!(engine.publisher_state(PublishChannel::Main), PublisherState::PublishRequesting);
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ids;
pub mod media;
pub mod mixer;
pub mod player;
pub mod publisher;
pub mod relay;
pub mod room;
pub mod signaling;
pub mod stats;

pub use engine::{Engine, EngineConfig};
pub use error::{Error, ErrorCode, Result};
