//! Playing remote streams

pub(crate) mod manager;
pub(crate) mod session;
pub mod state;

pub use manager::MAX_PLAY_VOLUME;
pub use session::{CdnConfig, PlayerConfig, PlayerInfo, DEFAULT_PLAY_VOLUME};
pub(crate) use session::PlayerSession;
pub use state::{PlayerMediaEvent, PlayerState};
