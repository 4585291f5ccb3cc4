//! Loopback service and its clients

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::ids::{RoomId, StreamId, TaskId, UserId};
use crate::signaling::{InboundSender, Inbound, MediaNotice, Request, Signaling};

use super::config::LoopbackConfig;
use super::mixer::MixerHost;
use super::registry::{PlayEntry, RoomEntry, StreamEntry};

/// Identifies one connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

struct ClientEntry {
    inbound: Option<InboundSender>,
    online: bool,
    /// Messages held back by `hold`
    held: Option<Vec<Inbound>>,
}

impl ClientEntry {
    fn push(&mut self, message: Inbound) {
        if let Some(held) = &mut self.held {
            held.push(message);
        } else if let Some(inbound) = &self.inbound {
            inbound.send(message);
        }
    }
}

/// Service state shared by every client
pub(super) struct Hub {
    pub(super) config: LoopbackConfig,
    started: Instant,
    last_stamp: u64,
    next_client: u64,
    next_message_id: u64,
    clients: BTreeMap<ClientId, ClientEntry>,
    pub(super) rooms: BTreeMap<RoomId, RoomEntry>,
    pub(super) streams: BTreeMap<StreamId, StreamEntry>,
    pub(super) plays: BTreeMap<(ClientId, StreamId), PlayEntry>,
    pub(super) mixer: MixerHost,
}

impl Hub {
    fn new(config: LoopbackConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            last_stamp: 0,
            next_client: 1,
            next_message_id: 1,
            clients: BTreeMap::new(),
            rooms: BTreeMap::new(),
            streams: BTreeMap::new(),
            plays: BTreeMap::new(),
            mixer: MixerHost::default(),
        }
    }

    /// Send a message to a client; dropped while its link is down
    pub(super) fn deliver(&mut self, client: ClientId, message: Inbound) {
        match self.clients.get_mut(&client) {
            Some(entry) if entry.online => entry.push(message),
            Some(_) => {
                tracing::trace!(client = %client, message = message.kind(), "Client offline, message dropped")
            }
            None => {}
        }
    }

    /// Monotonic relay timestamp in milliseconds since the service started
    pub(super) fn stamp(&mut self) -> u64 {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }

    pub(super) fn next_message_id(&mut self) -> String {
        let id = self.next_message_id;
        self.next_message_id += 1;
        format!("msg-{}", id)
    }

    fn is_online(&self, client: ClientId) -> bool {
        self.clients.get(&client).is_some_and(|entry| entry.online)
    }

    fn handle(&mut self, client: ClientId, request: Request) {
        if !self.is_online(client) {
            tracing::debug!(client = %client, request = request.kind(), "Request from offline client dropped");
            return;
        }
        tracing::trace!(client = %client, request = request.kind(), "Request");

        match request {
            Request::Login {
                seq,
                room_id,
                user,
                config,
                token,
            } => self.login(client, seq, room_id, user, config, token),
            Request::Logout { room_id } => self.logout(client, &room_id),

            Request::Publish {
                seq,
                room_id,
                channel,
                stream_id,
                params,
            } => self.publish(client, seq, room_id, channel, stream_id, params),
            Request::StopPublish { room_id, stream_id } => {
                self.stop_publish(client, &room_id, &stream_id)
            }
            Request::SetExtraInfo {
                seq,
                room_id,
                stream_id,
                extra_info,
            } => self.set_extra_info(client, seq, &room_id, &stream_id, extra_info),
            Request::MutePublish {
                stream_id,
                audio_muted,
                video_muted,
                ..
            } => self.mute_publish(client, &stream_id, audio_muted, video_muted),
            Request::AddCdnUrl { seq, stream_id, url } => {
                self.update_cdn_url(client, seq, &stream_id, url, true)
            }
            Request::RemoveCdnUrl { seq, stream_id, url } => {
                self.update_cdn_url(client, seq, &stream_id, url, false)
            }
            Request::SendSei { stream_id, data } => self.forward_sei(client, &stream_id, data),

            Request::Play {
                seq,
                room_id,
                stream_id,
                ..
            } => self.play(client, seq, room_id, stream_id),
            Request::StopPlay { stream_id, .. } => self.stop_play(client, &stream_id),

            Request::BroadcastMessage {
                seq,
                room_id,
                message,
            } => self.broadcast_message(client, seq, &room_id, message),
            Request::BarrageMessage {
                seq,
                room_id,
                message,
            } => self.barrage_message(client, seq, &room_id, message),
            Request::CustomCommand {
                seq,
                room_id,
                to_users,
                command,
            } => self.custom_command(client, seq, &room_id, &to_users, command),

            Request::StartMixer { seq, task } => self.start_mixer(client, seq, task),
            Request::StopMixer { seq, task_id } => self.stop_mixer(client, seq, task_id),
        }
    }

    fn interrupt(&mut self, client: ClientId) {
        let Some(entry) = self.clients.get_mut(&client).filter(|e| e.online) else {
            return;
        };
        entry.push(Inbound::LinkDown);
        entry.online = false;

        let now = Instant::now();
        for stream in self.streams.values_mut().filter(|s| s.owner == client) {
            stream.disconnected_at = Some(now);
        }
        tracing::info!(client = %client, "Client link interrupted");
    }

    fn restore(&mut self, client: ClientId) {
        let Some(entry) = self.clients.get_mut(&client).filter(|e| !e.online) else {
            return;
        };
        entry.online = true;
        entry.push(Inbound::LinkUp);
        tracing::info!(client = %client, "Client link restored");
    }

    fn sweep(&mut self, now: Instant) {
        self.sweep_streams(now);
        self.sweep_mixer(now);
    }

    /// A client went away for good
    fn disconnect(&mut self, client: ClientId) {
        let rooms: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.has_client(client))
            .map(|(room_id, _)| room_id.clone())
            .collect();
        for room_id in rooms {
            self.leave(client, &room_id, true);
        }
        self.plays.retain(|(player, _), _| *player != client);
        self.clients.remove(&client);

        tracing::debug!(client = %client, "Client disconnected");
    }
}

/// In-memory signaling service
///
/// Every [`LoopbackClient`] created with [`connect`](Self::connect) talks to
/// the same rooms, streams and mixer tasks. Replies are delivered through the
/// client's inbound channel, never synchronously.
///
/// The test controls simulate what a real network does to a client:
/// [`interrupt`](Self::interrupt)/[`restore`](Self::restore) drop and bring
/// back its link, [`hold`](Self::hold)/[`release`](Self::release) delay
/// everything sent to it.
#[derive(Clone)]
pub struct LoopbackServer {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackServer {
    /// Create a service with default configuration
    pub fn new() -> Self {
        Self::with_config(LoopbackConfig::default())
    }

    /// Create a service with custom configuration
    pub fn with_config(config: LoopbackConfig) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub::new(config))),
        }
    }

    /// Open a new client connection
    pub fn connect(&self) -> LoopbackClient {
        let mut hub = self.hub.lock();
        let id = ClientId(hub.next_client);
        hub.next_client += 1;
        hub.clients.insert(
            id,
            ClientEntry {
                inbound: None,
                online: true,
                held: None,
            },
        );

        LoopbackClient {
            id,
            server: self.clone(),
        }
    }

    /// Drop a client's link; it receives `LinkDown` and nothing else until
    /// [`restore`](Self::restore)
    ///
    /// Its streams stay in their rooms for the publisher grace period.
    pub fn interrupt(&self, client: ClientId) {
        self.hub.lock().interrupt(client);
    }

    /// Bring a client's link back
    pub fn restore(&self, client: ClientId) {
        self.hub.lock().restore(client);
    }

    /// Hold back everything sent to a client until [`release`](Self::release)
    pub fn hold(&self, client: ClientId) {
        if let Some(entry) = self.hub.lock().clients.get_mut(&client) {
            entry.held.get_or_insert_with(Vec::new);
        }
    }

    /// Deliver held messages in order and stop holding
    pub fn release(&self, client: ClientId) {
        let mut hub = self.hub.lock();
        let Some(entry) = hub.clients.get_mut(&client) else {
            return;
        };
        for message in entry.held.take().unwrap_or_default() {
            entry.push(message);
        }
    }

    /// Deliver a media notice to a client
    pub fn notify(&self, client: ClientId, notice: MediaNotice) {
        self.inject(client, Inbound::Media(notice));
    }

    /// Deliver an arbitrary message to a client
    pub fn inject(&self, client: ClientId, message: Inbound) {
        self.hub.lock().deliver(client, message);
    }

    /// Apply the publisher grace period and the mixer input grace window
    pub fn sweep(&self) {
        self.hub.lock().sweep(Instant::now());
    }

    /// Spawn background sweep task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweep_task(&self) -> tokio::task::JoinHandle<()> {
        let server = self.clone();
        let interval = server.hub.lock().config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                server.sweep();
            }
        })
    }

    /// Members of a room
    pub fn room_members(&self, room_id: &RoomId) -> Vec<UserId> {
        self.hub
            .lock()
            .rooms
            .get(room_id)
            .map(|room| room.members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a stream is published (including during its grace period)
    pub fn has_stream(&self, stream_id: &StreamId) -> bool {
        self.hub.lock().streams.contains_key(stream_id)
    }

    /// Inputs currently part of a mixer task's mix
    pub fn mixer_inputs(&self, task_id: &TaskId) -> Option<Vec<StreamId>> {
        self.hub.lock().mixer.inputs(task_id)
    }
}

impl Default for LoopbackServer {
    fn default() -> Self {
        Self::new()
    }
}

/// One engine's connection to a [`LoopbackServer`]
pub struct LoopbackClient {
    id: ClientId,
    server: LoopbackServer,
}

impl LoopbackClient {
    /// ID to use with the server's test controls
    pub fn id(&self) -> ClientId {
        self.id
    }
}

impl Signaling for LoopbackClient {
    fn attach(&self, inbound: InboundSender) {
        if let Some(entry) = self.server.hub.lock().clients.get_mut(&self.id) {
            entry.inbound = Some(inbound);
        }
    }

    fn send(&self, request: Request) {
        self.server.hub.lock().handle(self.id, request);
    }
}

impl Drop for LoopbackClient {
    fn drop(&mut self) {
        self.server.hub.lock().disconnect(self.id);
    }
}

impl fmt::Debug for LoopbackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackClient").field("id", &self.id).finish()
    }
}
