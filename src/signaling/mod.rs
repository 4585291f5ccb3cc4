//! Signaling service boundary
//!
//! The engine never talks to the network itself. Everything it needs from the
//! real-time service (room membership, stream registry, relays, mixing, IM)
//! goes through a [`Signaling`] implementation:
//!
//! ```text
//!   Engine ──send(Request)──► Signaling ──► service
//!     ▲                                        │
//!     └──────── InboundSender::send(Inbound) ◄─┘
//! ```
//!
//! [`loopback`] is an in-memory service for tests and demos.

pub mod loopback;
pub mod message;

use tokio::sync::mpsc;

use crate::engine::EngineInput;

pub use message::{Inbound, MediaNotice, PublishParams, Request, RequestId};

/// Transport to the real-time service
pub trait Signaling: Send + Sync + 'static {
    /// Called once when the engine is created
    fn attach(&self, inbound: InboundSender);

    /// Hand a request to the transport
    ///
    /// Must not block and must not call back into the engine before
    /// returning. Requests are sent in call order.
    fn send(&self, request: Request);
}

/// Feeds service messages into an engine
#[derive(Clone)]
pub struct InboundSender {
    tx: mpsc::UnboundedSender<EngineInput>,
}

impl InboundSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineInput>) -> Self {
        Self { tx }
    }

    /// Deliver a message; returns `false` once the engine is gone
    pub fn send(&self, message: Inbound) -> bool {
        self.tx.send(EngineInput::Server(message)).is_ok()
    }

    /// Whether the engine has shut down
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for InboundSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
