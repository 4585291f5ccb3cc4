//! Rooms
//!
//! A room is the unit of membership: the engine logs in, keeps the member
//! and stream lists current, and owns every publish and play session opened
//! in it. Logging out (or losing the room) ends them all.
//!
//! ```text
//!   Disconnected ──login──► Connecting ──ack──► Connected
//!        ▲                      ▲                   │
//!        │                      └──── link lost ────┘
//!        └── logout / kicked / rejected / reconnect window expired
//! ```

pub mod config;
pub mod handle;
pub mod im;
pub(crate) mod session;
pub mod state;
mod supervisor;

pub use config::RoomConfig;
pub use handle::Room;
pub use im::{BarrageMessageInfo, BarrageSendResult, MessageInfo};
pub(crate) use session::RoomSession;
pub use state::RoomState;
