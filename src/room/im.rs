//! In-room messaging: broadcast messages, barrage messages and custom
//! commands

use serde::{Deserialize, Serialize};

use crate::dispatch::Event;
use crate::engine::completion::{Completion, Responder};
use crate::engine::state::{EngineState, Outbox};
use crate::error::{Error, ErrorCode, Result};
use crate::ids::{RoomId, User, UserId};
use crate::signaling::{Request, RequestId};

use super::session::RoomSession;

/// A received broadcast message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub message: String,
    /// Milliseconds, as stamped by the service
    pub send_time: u64,
    pub from_user: User,
}

/// A received barrage message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrageMessageInfo {
    pub message: String,
    pub message_id: String,
    pub send_time: u64,
    pub from_user: User,
}

/// Outcome of `send_barrage_message`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BarrageSendResult {
    pub error_code: ErrorCode,
    /// Service-assigned ID, empty on failure
    pub message_id: String,
}

impl From<ErrorCode> for BarrageSendResult {
    fn from(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            message_id: String::new(),
        }
    }
}

/// What an outgoing message is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    Broadcast,
    Barrage,
    Command,
}

impl MessageKind {
    fn rate_limited(self) -> bool {
        self != MessageKind::Barrage
    }
}

impl EngineState {
    /// Check an outgoing message and find its room
    ///
    /// `Ok(None)` means the room is not connected; the call completes with
    /// `ROOM_NOT_LOGGED_IN` rather than failing locally.
    fn message_room(
        &mut self,
        room_id: &RoomId,
        message: &str,
        kind: MessageKind,
    ) -> Result<Option<&mut RoomSession>> {
        if message.is_empty() {
            return Err(Error::InvalidParam("empty message".into()));
        }
        if message.len() > self.config.max_message_size {
            return Err(Error::TooLong {
                what: "message",
                limit: self.config.max_message_size,
            });
        }

        let Some(room) = self.rooms.get_mut(room_id).filter(|r| r.is_connected()) else {
            return Ok(None);
        };
        if kind.rate_limited() && !room.im_limiter.try_acquire() {
            return Err(Error::RateLimited("IM"));
        }
        Ok(Some(room))
    }

    pub(crate) fn send_broadcast_message(
        &mut self,
        room_id: &RoomId,
        message: String,
        out: &mut Outbox,
    ) -> Result<Completion<ErrorCode>> {
        let seq = self.next_seq();
        if self.message_room(room_id, &message, MessageKind::Broadcast)?.is_none() {
            return Ok(Completion::ready(ErrorCode::ROOM_NOT_LOGGED_IN));
        }

        out.send(Request::BroadcastMessage {
            seq,
            room_id: room_id.clone(),
            message,
        });
        Ok(self.completions.code(seq, Some(room_id.clone())))
    }

    pub(crate) fn send_barrage_message(
        &mut self,
        room_id: &RoomId,
        message: String,
        out: &mut Outbox,
    ) -> Result<Completion<BarrageSendResult>> {
        let seq = self.next_seq();
        if self.message_room(room_id, &message, MessageKind::Barrage)?.is_none() {
            return Ok(Completion::ready(BarrageSendResult::from(
                ErrorCode::ROOM_NOT_LOGGED_IN,
            )));
        }

        out.send(Request::BarrageMessage {
            seq,
            room_id: room_id.clone(),
            message,
        });
        Ok(self.completions.barrage(seq, room_id.clone()))
    }

    /// Send a command to some members, or to the whole room if `to_users`
    /// is empty
    pub(crate) fn send_custom_command(
        &mut self,
        room_id: &RoomId,
        command: String,
        to_users: Vec<UserId>,
        out: &mut Outbox,
    ) -> Result<Completion<ErrorCode>> {
        let seq = self.next_seq();
        if self.message_room(room_id, &command, MessageKind::Command)?.is_none() {
            return Ok(Completion::ready(ErrorCode::ROOM_NOT_LOGGED_IN));
        }

        out.send(Request::CustomCommand {
            seq,
            room_id: room_id.clone(),
            to_users,
            command,
        });
        Ok(self.completions.code(seq, Some(room_id.clone())))
    }

    pub(crate) fn on_barrage_result(&mut self, seq: RequestId, error_code: ErrorCode, message_id: String) {
        match self.completions.take(seq) {
            Some(Responder::Barrage(tx)) => {
                let _ = tx.send(BarrageSendResult {
                    error_code,
                    message_id,
                });
            }
            Some(other) => other.fail(error_code),
            None => tracing::debug!(seq = seq, "Barrage result for unknown request dropped"),
        }
    }

    pub(crate) fn on_recv_broadcast(&mut self, room_id: &RoomId, messages: Vec<MessageInfo>, out: &mut Outbox) {
        if self.rooms.contains_key(room_id) && !messages.is_empty() {
            out.emit(Event::ImRecvBroadcastMessage {
                room_id: room_id.clone(),
                messages,
            });
        }
    }

    pub(crate) fn on_recv_barrage(
        &mut self,
        room_id: &RoomId,
        messages: Vec<BarrageMessageInfo>,
        out: &mut Outbox,
    ) {
        if self.rooms.contains_key(room_id) && !messages.is_empty() {
            out.emit(Event::ImRecvBarrageMessage {
                room_id: room_id.clone(),
                messages,
            });
        }
    }

    pub(crate) fn on_recv_custom_command(
        &mut self,
        room_id: &RoomId,
        from_user: User,
        command: String,
        out: &mut Outbox,
    ) {
        if self.rooms.contains_key(room_id) {
            out.emit(Event::ImRecvCustomCommand {
                room_id: room_id.clone(),
                from_user,
                command,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::testing::*;
    use crate::signaling::Inbound;

    fn sent_seq(out: &Outbox) -> RequestId {
        match &out.requests[..] {
            [Request::BroadcastMessage { seq, .. }]
            | [Request::BarrageMessage { seq, .. }]
            | [Request::CustomCommand { seq, .. }] => *seq,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_completes() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");

        let mut out = Outbox::default();
        let completion = state
            .send_broadcast_message(&room_id, "hello".into(), &mut out)
            .unwrap();
        input(
            &mut state,
            Inbound::RequestResult {
                seq: sent_seq(&out),
                error_code: ErrorCode::SUCCESS,
            },
        );

        assert_eq!(completion.await, ErrorCode::SUCCESS);
    }

    #[tokio::test]
    async fn test_barrage_carries_message_id() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");

        let mut out = Outbox::default();
        let completion = state
            .send_barrage_message(&room_id, "wow".into(), &mut out)
            .unwrap();
        input(
            &mut state,
            Inbound::BarrageResult {
                seq: sent_seq(&out),
                error_code: ErrorCode::SUCCESS,
                message_id: "m-1".into(),
            },
        );

        let result = completion.await;
        assert_eq!(result.error_code, ErrorCode::SUCCESS);
        assert_eq!(result.message_id, "m-1");
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let mut state = state();
        let mut out = Outbox::default();

        let completion = state
            .send_broadcast_message(&room("r1"), "hello".into(), &mut out)
            .unwrap();
        assert_eq!(completion.await, ErrorCode::ROOM_NOT_LOGGED_IN);
        assert!(out.requests.is_empty());
    }

    #[tokio::test]
    async fn test_logout_cancels_pending() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        let mut out = Outbox::default();
        let completion = state
            .send_custom_command(&room_id, "ping".into(), Vec::new(), &mut out)
            .unwrap();

        state.logout(&room_id, &mut out);
        assert_eq!(completion.await, ErrorCode::REQUEST_CANCELLED);
    }

    #[test]
    fn test_message_size() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        let mut out = Outbox::default();

        assert!(matches!(
            state.send_broadcast_message(&room_id, String::new(), &mut out),
            Err(Error::InvalidParam(_))
        ));
        assert!(matches!(
            state.send_broadcast_message(&room_id, "x".repeat(257), &mut out),
            Err(Error::TooLong { .. })
        ));
        assert!(state
            .send_broadcast_message(&room_id, "x".repeat(256), &mut out)
            .is_ok());
    }

    #[test]
    fn test_broadcast_and_commands_share_limit() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        let mut out = Outbox::default();

        for i in 0..600 {
            let result = if i % 2 == 0 {
                state.send_broadcast_message(&room_id, "m".into(), &mut out)
            } else {
                state.send_custom_command(&room_id, "c".into(), Vec::new(), &mut out)
            };
            assert!(result.is_ok());
        }

        assert!(matches!(
            state.send_custom_command(&room_id, "c".into(), Vec::new(), &mut out),
            Err(Error::RateLimited(_))
        ));
        // Barrage messages are not counted
        assert!(state
            .send_barrage_message(&room_id, "b".into(), &mut out)
            .is_ok());
    }

    #[test]
    fn test_received_messages_forwarded() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        let sender = User::with_id("u2").unwrap();

        let out = input(
            &mut state,
            Inbound::CustomCommand {
                room_id: room_id.clone(),
                from_user: sender.clone(),
                command: "ping".into(),
            },
        );
        assert_eq!(kinds(&out), vec!["im_recv_custom_command"]);

        let out = input(
            &mut state,
            Inbound::BroadcastMessage {
                room_id: room("other"),
                messages: vec![MessageInfo {
                    message: "hi".into(),
                    send_time: 1,
                    from_user: sender,
                }],
            },
        );
        assert!(out.events.is_empty());
    }
}
