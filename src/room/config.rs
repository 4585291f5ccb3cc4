//! Room configuration

use serde::{Deserialize, Serialize};

/// Options for joining a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Member limit applied when this login creates the room (0 = unlimited)
    pub max_member_count: u32,

    /// Deliver `on_room_user_update` for members joining and leaving
    pub is_user_status_notify: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_member_count: 0,
            is_user_status_notify: false,
        }
    }
}

impl RoomConfig {
    /// Set the member limit
    pub fn max_member_count(mut self, count: u32) -> Self {
        self.max_member_count = count;
        self
    }

    /// Enable membership notifications
    pub fn user_status_notify(mut self, notify: bool) -> Self {
        self.is_user_status_notify = notify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RoomConfig::default();

        assert_eq!(config.max_member_count, 0);
        assert!(!config.is_user_status_notify);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RoomConfig::default()
            .max_member_count(2)
            .user_status_notify(true);

        assert_eq!(config.max_member_count, 2);
        assert!(config.is_user_status_notify);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RoomConfig = serde_json::from_str(r#"{"is_user_status_notify": true}"#).unwrap();

        assert_eq!(config.max_member_count, 0);
        assert!(config.is_user_status_notify);
    }
}
