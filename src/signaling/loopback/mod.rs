//! In-memory signaling service
//!
//! [`LoopbackServer`] plays the real-time service for tests and demos.
//! Several engines connect to one server and see each other's rooms,
//! members and streams.
//!
//! # Architecture
//!
//! ```text
//!   Engine A ──LoopbackClient::send──┐
//!                                    ▼
//!                          LoopbackServer (Mutex<Hub>)
//!                          rooms, streams, plays, mixer tasks
//!                                    │
//!   Engine B ◄──InboundSender────────┘  (replies and fan-out, never inline)
//! ```
//!
//! # Example
//! ```no_run
//! use rtc_session::engine::{Engine, EngineConfig};
//! use rtc_session::signaling::loopback::LoopbackServer;
//!
//! # async fn example() -> rtc_session::Result<()> {
//! let server = LoopbackServer::new();
//! let client = server.connect();
//! let id = client.id();
//! let _engine = Engine::new(EngineConfig::default(), client)?;
//!
//! // Simulate a dropped connection
//! server.interrupt(id);
//! server.restore(id);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod mixer;
mod registry;
pub mod server;

pub use config::LoopbackConfig;
pub use server::{ClientId, LoopbackClient, LoopbackServer};
