//! Error types
//!
//! Failures come in two shapes:
//! - [`Error`] is returned synchronously when a call is rejected locally,
//!   before anything is sent to the service (malformed IDs, oversized
//!   payloads, rate limits).
//! - [`ErrorCode`] travels with every asynchronous completion delivered
//!   through the event handlers. `0` is success.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for synchronous engine calls
pub type Result<T> = std::result::Result<T, Error>;

/// Synchronous rejection of an engine call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Room ID is empty, too long, or uses characters outside the allowed set
    #[error("invalid room id: {0}")]
    InvalidRoomId(String),

    /// Stream ID is empty, too long, or uses disallowed characters
    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),

    /// User ID or user name is malformed
    #[error("invalid user: {0}")]
    InvalidUser(String),

    /// Mixer task ID is malformed
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    /// A parameter is out of range or otherwise unusable
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// A payload exceeds its documented size limit
    #[error("{what} exceeds {limit} bytes")]
    TooLong {
        /// What was too long
        what: &'static str,
        /// Limit in bytes
        limit: usize,
    },

    /// A documented frequency limit was exceeded
    #[error("rate limit exceeded for {0}")]
    RateLimited(&'static str),

    /// Observer list is full
    #[error("event handler limit reached ({0})")]
    TooManyHandlers(usize),

    /// The engine must be created from within a tokio runtime
    #[error("no tokio runtime available")]
    NoRuntime,

    /// The engine was destroyed
    #[error("engine has been destroyed")]
    EngineDestroyed,
}

impl Error {
    /// Error code reported through `on_debug_error` for this rejection
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidRoomId(_) => ErrorCode::ROOM_INVALID_ID,
            Error::InvalidStreamId(_) => ErrorCode::INVALID_STREAM_ID,
            Error::InvalidUser(_) => ErrorCode::ROOM_INVALID_USER,
            Error::InvalidTaskId(_) => ErrorCode::MIXER_INVALID_TASK_ID,
            Error::InvalidParam(_) => ErrorCode::INVALID_PARAM,
            Error::TooLong { .. } => ErrorCode::PAYLOAD_TOO_LONG,
            Error::RateLimited(_) => ErrorCode::RATE_LIMITED,
            Error::TooManyHandlers(_) => ErrorCode::INVALID_PARAM,
            Error::NoRuntime => ErrorCode::ENGINE_NOT_CREATED,
            Error::EngineDestroyed => ErrorCode::ENGINE_NOT_CREATED,
        }
    }
}

/// Integer completion code shared by every asynchronous result
///
/// `ErrorCode::SUCCESS` (0) is the only success value. Callers must treat the
/// code as authoritative even when a state transition was also reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    /// Success
    pub const SUCCESS: ErrorCode = ErrorCode(0);

    // Common
    /// Engine was not created or has been destroyed
    pub const ENGINE_NOT_CREATED: ErrorCode = ErrorCode(1_000_001);
    /// Generic invalid parameter
    pub const INVALID_PARAM: ErrorCode = ErrorCode(1_000_002);
    /// Stream ID failed validation
    pub const INVALID_STREAM_ID: ErrorCode = ErrorCode(1_000_003);
    /// Payload exceeds its size limit
    pub const PAYLOAD_TOO_LONG: ErrorCode = ErrorCode(1_000_004);
    /// Frequency limit exceeded
    pub const RATE_LIMITED: ErrorCode = ErrorCode(1_000_005);
    /// The link dropped while the request was in flight
    pub const NETWORK_INTERRUPTED: ErrorCode = ErrorCode(1_000_010);
    /// The request was dropped without an answer
    pub const REQUEST_CANCELLED: ErrorCode = ErrorCode(1_000_011);

    // Room
    /// Room ID failed validation
    pub const ROOM_INVALID_ID: ErrorCode = ErrorCode(1_002_001);
    /// User ID or name failed validation
    pub const ROOM_INVALID_USER: ErrorCode = ErrorCode(1_002_002);
    /// The operation needs a logged-in room
    pub const ROOM_NOT_LOGGED_IN: ErrorCode = ErrorCode(1_002_003);
    /// The service rejected the token
    pub const ROOM_AUTH_FAILED: ErrorCode = ErrorCode(1_002_010);
    /// The room reached its member limit
    pub const ROOM_FULL: ErrorCode = ErrorCode(1_002_011);
    /// Login was not acknowledged in time
    pub const ROOM_LOGIN_TIMEOUT: ErrorCode = ErrorCode(1_002_030);
    /// The same user ID logged in from another client
    pub const ROOM_KICKED_LOGIN_ELSEWHERE: ErrorCode = ErrorCode(1_002_050);
    /// The link did not come back within the reconnect window
    pub const ROOM_RECONNECT_FAILED: ErrorCode = ErrorCode(1_002_051);

    // Publisher
    /// Publishing requires membership of the room
    pub const PUBLISHER_NOT_IN_ROOM: ErrorCode = ErrorCode(1_003_001);
    /// Another client already publishes this stream ID
    pub const PUBLISHER_DUPLICATE_STREAM: ErrorCode = ErrorCode(1_003_010);
    /// The channel is publishing in another room
    pub const PUBLISHER_CHANNEL_IN_USE: ErrorCode = ErrorCode(1_003_011);
    /// The operation needs an active publish
    pub const PUBLISHER_NOT_PUBLISHING: ErrorCode = ErrorCode(1_003_020);

    // Player
    /// Playing requires membership of the room
    pub const PLAYER_NOT_IN_ROOM: ErrorCode = ErrorCode(1_004_001);

    // Mixer
    /// Task ID failed validation
    pub const MIXER_INVALID_TASK_ID: ErrorCode = ErrorCode(1_005_001);
    /// Task has no input streams
    pub const MIXER_NO_INPUT: ErrorCode = ErrorCode(1_005_002);
    /// Task has no output targets
    pub const MIXER_NO_OUTPUT: ErrorCode = ErrorCode(1_005_003);
    /// No task with this ID exists on the service
    pub const MIXER_TASK_NOT_FOUND: ErrorCode = ErrorCode(1_005_010);

    // IM
    /// Message is empty or exceeds 256 bytes
    pub const IM_INVALID_MESSAGE: ErrorCode = ErrorCode(1_009_001);

    /// Whether this code means success
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Symbolic name, if this is one of the known codes
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            ErrorCode::SUCCESS => "SUCCESS",
            ErrorCode::ENGINE_NOT_CREATED => "ENGINE_NOT_CREATED",
            ErrorCode::INVALID_PARAM => "INVALID_PARAM",
            ErrorCode::INVALID_STREAM_ID => "INVALID_STREAM_ID",
            ErrorCode::PAYLOAD_TOO_LONG => "PAYLOAD_TOO_LONG",
            ErrorCode::RATE_LIMITED => "RATE_LIMITED",
            ErrorCode::NETWORK_INTERRUPTED => "NETWORK_INTERRUPTED",
            ErrorCode::REQUEST_CANCELLED => "REQUEST_CANCELLED",
            ErrorCode::ROOM_INVALID_ID => "ROOM_INVALID_ID",
            ErrorCode::ROOM_INVALID_USER => "ROOM_INVALID_USER",
            ErrorCode::ROOM_NOT_LOGGED_IN => "ROOM_NOT_LOGGED_IN",
            ErrorCode::ROOM_AUTH_FAILED => "ROOM_AUTH_FAILED",
            ErrorCode::ROOM_FULL => "ROOM_FULL",
            ErrorCode::ROOM_LOGIN_TIMEOUT => "ROOM_LOGIN_TIMEOUT",
            ErrorCode::ROOM_KICKED_LOGIN_ELSEWHERE => "ROOM_KICKED_LOGIN_ELSEWHERE",
            ErrorCode::ROOM_RECONNECT_FAILED => "ROOM_RECONNECT_FAILED",
            ErrorCode::PUBLISHER_NOT_IN_ROOM => "PUBLISHER_NOT_IN_ROOM",
            ErrorCode::PUBLISHER_DUPLICATE_STREAM => "PUBLISHER_DUPLICATE_STREAM",
            ErrorCode::PUBLISHER_CHANNEL_IN_USE => "PUBLISHER_CHANNEL_IN_USE",
            ErrorCode::PUBLISHER_NOT_PUBLISHING => "PUBLISHER_NOT_PUBLISHING",
            ErrorCode::PLAYER_NOT_IN_ROOM => "PLAYER_NOT_IN_ROOM",
            ErrorCode::MIXER_INVALID_TASK_ID => "MIXER_INVALID_TASK_ID",
            ErrorCode::MIXER_NO_INPUT => "MIXER_NO_INPUT",
            ErrorCode::MIXER_NO_OUTPUT => "MIXER_NO_OUTPUT",
            ErrorCode::MIXER_TASK_NOT_FOUND => "MIXER_TASK_NOT_FOUND",
            ErrorCode::IM_INVALID_MESSAGE => "IM_INVALID_MESSAGE",
            _ => return None,
        };
        Some(name)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        ErrorCode(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_code() {
        assert!(ErrorCode::SUCCESS.is_success());
        assert!(!ErrorCode::ROOM_FULL.is_success());
        assert_eq!(ErrorCode::default(), ErrorCode::SUCCESS);
    }

    #[test]
    fn test_display_known_and_unknown() {
        assert_eq!(
            ErrorCode::ROOM_KICKED_LOGIN_ELSEWHERE.to_string(),
            "1002050 (ROOM_KICKED_LOGIN_ELSEWHERE)"
        );
        assert_eq!(ErrorCode(42).to_string(), "42");
    }

    #[test]
    fn test_local_error_codes() {
        assert_eq!(
            Error::InvalidRoomId("x".into()).code(),
            ErrorCode::ROOM_INVALID_ID
        );
        assert_eq!(Error::RateLimited("sei").code(), ErrorCode::RATE_LIMITED);
        assert_eq!(
            Error::TooLong {
                what: "sei",
                limit: 4096
            }
            .to_string(),
            "sei exceeds 4096 bytes"
        );
    }
}
