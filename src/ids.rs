//! Validated identifiers
//!
//! Room, stream, user and mixer task IDs are plain strings on the wire but
//! carry length and charset constraints. Each is a newtype that can only be
//! built through validation, so the rest of the crate never re-checks them.
//!
//! | ID        | Max bytes | Extra rule                          |
//! |-----------|-----------|-------------------------------------|
//! | Room      | 128       |                                     |
//! | Stream    | 256       | no URL delimiters (`/ # & = %`)     |
//! | Task      | 256       | no URL delimiters (`/ # & = %`)     |
//! | User      | 64        | no `#`                              |

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Maximum room ID length in bytes
pub const MAX_ROOM_ID_LEN: usize = 128;
/// Maximum stream ID length in bytes
pub const MAX_STREAM_ID_LEN: usize = 256;
/// Maximum mixer task ID length in bytes
pub const MAX_TASK_ID_LEN: usize = 256;
/// Maximum user ID length in bytes
pub const MAX_USER_ID_LEN: usize = 64;
/// Maximum user name length in bytes
pub const MAX_USER_NAME_LEN: usize = 256;
/// Maximum stream extra info length in bytes
pub const MAX_EXTRA_INFO_LEN: usize = 1024;

const SYMBOLS: &str = "~!@#$%^&*()_+=-`;',.<>/";
const URL_DELIMITERS: &str = "/#&=%";

fn allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || SYMBOLS.contains(c)
}

fn check(value: &str, max: usize, forbidden: &str) -> bool {
    !value.is_empty()
        && value.len() <= max
        && value.chars().all(|c| allowed(c) && !forbidden.contains(c))
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $max:expr, $forbidden:expr, $err:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an identifier
            pub fn new(value: impl Into<String>) -> Result<Self, Error> {
                let value = value.into();
                if check(&value, $max, $forbidden) {
                    Ok(Self(value))
                } else {
                    Err(Error::$err(value))
                }
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self, Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self, Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

identifier!(
    /// Room identifier
    RoomId,
    MAX_ROOM_ID_LEN,
    "",
    InvalidRoomId
);

identifier!(
    /// Stream identifier, unique per application
    StreamId,
    MAX_STREAM_ID_LEN,
    URL_DELIMITERS,
    InvalidStreamId
);

identifier!(
    /// Mixer task identifier
    TaskId,
    MAX_TASK_ID_LEN,
    URL_DELIMITERS,
    InvalidTaskId
);

identifier!(
    /// User identifier, unique per application
    UserId,
    MAX_USER_ID_LEN,
    "#",
    InvalidUser
);

/// A room member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID
    pub user_id: UserId,
    /// Display name (at most 256 bytes)
    pub user_name: String,
}

impl User {
    /// Create a user with an explicit display name
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Result<Self, Error> {
        let user_id = UserId::new(user_id)?;
        let user_name = user_name.into();
        if user_name.len() > MAX_USER_NAME_LEN {
            return Err(Error::InvalidUser(user_name));
        }
        Ok(Self { user_id, user_name })
    }

    /// Create a user whose display name equals its ID
    pub fn with_id(user_id: impl Into<String>) -> Result<Self, Error> {
        let user_id = UserId::new(user_id)?;
        let user_name = user_id.as_str().to_string();
        Ok(Self { user_id, user_name })
    }
}

/// A stream published in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Publishing user
    pub user: User,
    /// Stream ID
    pub stream_id: StreamId,
    /// Application-defined extra info (at most 1024 bytes)
    pub extra_info: String,
}
