//! Channel-backed observer

use std::sync::Arc;

use tokio::sync::mpsc;

use super::event::Event;
use super::handler::EventHandler;

/// Observer that forwards every event into an mpsc channel
///
/// # Example
/// ```no_run
/// use rtc_session::dispatch::EventChannel;
/// use rtc_session::engine::{Engine, EngineConfig};
/// use rtc_session::signaling::loopback::LoopbackServer;
///
/// # async fn example() -> rtc_session::Result<()> {
/// let server = LoopbackServer::new();
/// let engine = Engine::new(EngineConfig::default(), server.connect())?;
///
/// let (observer, mut events) = EventChannel::new();
/// engine.add_event_handler(&observer)?;
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("{:?}", event);
///     }
/// });
/// # Ok(())
/// # }
/// ```
pub struct EventChannel {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventChannel {
    /// Create the observer and the receiving end of its channel
    ///
    /// Keep the returned `Arc` alive for as long as events should flow.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl EventHandler for EventChannel {
    fn on_event(&self, event: &Event) {
        let _ = self.tx.send(event.clone());
    }
}
