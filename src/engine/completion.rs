//! Awaitable results of request/response calls
//!
//! Calls like `set_stream_extra_info` or `start_mixer_task` return a
//! [`Completion`]. The engine keeps the sending half in a [`CompletionTable`]
//! keyed by request ID until the service answers, the link drops, the owning
//! room goes away, or the engine is destroyed. A completion always resolves;
//! a dropped request resolves to `REQUEST_CANCELLED`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::ErrorCode;
use crate::ids::RoomId;
use crate::mixer::MixerStartResult;
use crate::room::BarrageSendResult;
use crate::signaling::RequestId;

/// Result of an asynchronous call
///
/// Resolves to `T`, which always carries an [`ErrorCode`]. Dropping a
/// completion does not cancel the request.
#[must_use = "completions report the outcome of the request"]
#[derive(Debug)]
pub struct Completion<T> {
    inner: Inner<T>,
}

#[derive(Debug)]
enum Inner<T> {
    Ready(Option<T>),
    Pending(oneshot::Receiver<T>),
}

impl<T> Completion<T> {
    /// An already resolved completion
    pub fn ready(value: T) -> Self {
        Self {
            inner: Inner::Ready(Some(value)),
        }
    }

    fn pending() -> (oneshot::Sender<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                inner: Inner::Pending(rx),
            },
        )
    }
}

impl<T: From<ErrorCode> + Unpin> Future for Completion<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        match &mut self.get_mut().inner {
            Inner::Ready(value) => Poll::Ready(
                value
                    .take()
                    .unwrap_or_else(|| T::from(ErrorCode::REQUEST_CANCELLED)),
            ),
            Inner::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or_else(|_| T::from(ErrorCode::REQUEST_CANCELLED))),
        }
    }
}

/// Sending half of a pending completion
#[derive(Debug)]
pub(crate) enum Responder {
    Code(oneshot::Sender<ErrorCode>),
    MixerStart(oneshot::Sender<MixerStartResult>),
    Barrage(oneshot::Sender<BarrageSendResult>),
}

impl Responder {
    /// Resolve with an error code and no payload
    pub(crate) fn fail(self, code: ErrorCode) {
        match self {
            Responder::Code(tx) => {
                let _ = tx.send(code);
            }
            Responder::MixerStart(tx) => {
                let _ = tx.send(MixerStartResult::from(code));
            }
            Responder::Barrage(tx) => {
                let _ = tx.send(BarrageSendResult::from(code));
            }
        }
    }
}

struct Pending {
    /// Room whose teardown cancels the request
    room: Option<RoomId>,
    responder: Responder,
}

/// Outstanding completions keyed by request ID
#[derive(Default)]
pub(crate) struct CompletionTable {
    pending: HashMap<RequestId, Pending>,
}

impl CompletionTable {
    /// Register a plain error-code completion
    pub(crate) fn code(&mut self, seq: RequestId, room: Option<RoomId>) -> Completion<ErrorCode> {
        let (tx, completion) = Completion::pending();
        self.insert(seq, room, Responder::Code(tx));
        completion
    }

    pub(crate) fn mixer_start(&mut self, seq: RequestId) -> Completion<MixerStartResult> {
        let (tx, completion) = Completion::pending();
        self.insert(seq, None, Responder::MixerStart(tx));
        completion
    }

    pub(crate) fn barrage(&mut self, seq: RequestId, room: RoomId) -> Completion<BarrageSendResult> {
        let (tx, completion) = Completion::pending();
        self.insert(seq, Some(room), Responder::Barrage(tx));
        completion
    }

    fn insert(&mut self, seq: RequestId, room: Option<RoomId>, responder: Responder) {
        self.pending.insert(seq, Pending { room, responder });
    }

    /// Take the responder for a reply, if the request is still outstanding
    pub(crate) fn take(&mut self, seq: RequestId) -> Option<Responder> {
        self.pending.remove(&seq).map(|p| p.responder)
    }

    /// Fail every outstanding request
    pub(crate) fn fail_all(&mut self, code: ErrorCode) {
        for (_, pending) in self.pending.drain() {
            pending.responder.fail(code);
        }
    }

    /// Fail the requests scoped to a room
    pub(crate) fn fail_room(&mut self, room_id: &RoomId, code: ErrorCode) {
        let seqs: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.room.as_ref() == Some(room_id))
            .map(|(seq, _)| *seq)
            .collect();

        for seq in seqs {
            if let Some(pending) = self.pending.remove(&seq) {
                pending.responder.fail(code);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
