//! Loopback call - a host and an audience member in one process
//!
//! Run with: cargo run --example loopback_call
//!
//! This example demonstrates:
//! - Connecting two engines to an in-process `LoopbackServer`
//! - Logging into a room, publishing and playing a stream
//! - Observing events with a custom `EventHandler`
//! - Room IM and stream extra info
//!
//! ```text
//!   host engine ──publish s1──>┌────────────────┐
//!                              │ LoopbackServer │
//!   audience engine <──play s1─└────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use rtc_session::dispatch::{Event, EventHandler};
use rtc_session::ids::User;
use rtc_session::player::PlayerConfig;
use rtc_session::publisher::PublishChannel;
use rtc_session::room::RoomConfig;
use rtc_session::signaling::loopback::LoopbackServer;
use rtc_session::{Engine, EngineConfig};

/// Prints every event with the name of the engine that produced it
struct Printer {
    name: &'static str,
}

impl EventHandler for Printer {
    fn on_event(&self, event: &Event) {
        match event {
            Event::RoomStateUpdate {
                room_id,
                state,
                error_code,
                ..
            } => println!("[{}] room {} -> {:?} ({})", self.name, room_id, state, error_code),
            Event::PublisherStateUpdate { stream_id, state, .. } => {
                println!("[{}] publishing {} -> {:?}", self.name, stream_id, state)
            }
            Event::PlayerStateUpdate { stream_id, state, .. } => {
                println!("[{}] playing {} -> {:?}", self.name, stream_id, state)
            }
            Event::ImRecvBroadcastMessage { messages, .. } => {
                for message in messages {
                    println!("[{}] {} says: {}", self.name, message.from_user.user_id, message.message);
                }
            }
            other => println!("[{}] {}", self.name, other.kind()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtc_session=info".parse()?)
                .add_directive("loopback_call=debug".parse()?),
        )
        .init();

    println!("rtc-session {}", Engine::version());

    let server = LoopbackServer::new();
    let _sweeper = server.spawn_sweep_task();

    let host = Engine::new(EngineConfig::default(), server.connect())?;
    let audience = Engine::new(EngineConfig::default(), server.connect())?;

    let host_printer = Arc::new(Printer { name: "host" });
    let audience_printer = Arc::new(Printer { name: "audience" });
    host.add_event_handler(&host_printer)?;
    audience.add_event_handler(&audience_printer)?;

    let config = RoomConfig::default().user_status_notify(true);
    let host_room = host.login_room("lobby", User::new("host", "Host")?, config.clone())?;
    host_room.start_publishing_stream("s1", PublishChannel::Main)?;

    let audience_room = audience.login_room("lobby", User::new("viewer", "Viewer")?, config)?;
    audience_room.start_playing_stream("s1", None, PlayerConfig::default())?;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let code = host.set_stream_extra_info("live now", PublishChannel::Main)?.await;
    println!("extra info update: {}", code);

    let code = host_room.send_broadcast_message("welcome!")?.await;
    println!("broadcast: {}", code);

    tokio::time::sleep(Duration::from_millis(100)).await;

    audience_room.logout()?;
    host.stop_publishing_stream(PublishChannel::Main)?;
    host_room.logout()?;

    tokio::time::sleep(Duration::from_millis(100)).await;

    host.destroy();
    audience.destroy();
    Ok(())
}
