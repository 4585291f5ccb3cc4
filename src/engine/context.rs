//! Engine context
//!
//! [`Engine`] is the explicit handle applications create, clone and pass
//! around; there is no process-wide instance. It owns the session state, the
//! event dispatcher and the signaling transport, plus two tasks on the
//! current tokio runtime:
//!
//! ```text
//!   Signaling ──► InboundSender ──► driver task ──┐
//!   timers ───────────────────────────────────────┤
//!   public calls ─────────────────────────────────┼─► EngineState (one lock)
//!                                                 │        │
//!                              delivery task ◄── events ◄──┘──► requests ──► Signaling
//! ```

use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatch::dispatcher::Dispatcher;
use crate::dispatch::{Event, EventHandler};
use crate::error::{Error, ErrorCode, Result};
use crate::ids::{RoomId, StreamId, TaskId, User};
use crate::media::{
    AudioConfig, BeautifyFeature, BeautifyOption, Canvas, MirrorMode, TrafficControlMinVideoBitrateMode,
    TrafficControlProperty, VideoConfig, Watermark,
};
use crate::mixer::{MixerStartResult, MixerTask, MixerTaskPhase};
use crate::player::{PlayerInfo, PlayerState};
use crate::publisher::{ChannelConfig, PublishChannel, PublisherInfo, PublisherState};
use crate::relay::RelayCdnInfo;
use crate::room::{Room, RoomConfig, RoomState};
use crate::signaling::{InboundSender, Signaling};

use super::completion::Completion;
use super::config::EngineConfig;
use super::state::{EngineInput, EngineState, Outbox};

/// Maximum capture volume
pub const MAX_CAPTURE_VOLUME: u32 = 100;

struct Shared {
    state: Mutex<EngineState>,
    dispatcher: Dispatcher,
    signaling: Box<dyn Signaling>,
    input_tx: mpsc::UnboundedSender<EngineInput>,
    runtime: Handle,
}

impl Shared {
    /// Mutate the state and flush its side effects before unlocking
    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState, &mut Outbox) -> R) -> R {
        let mut state = self.state.lock();
        let mut out = Outbox::default();
        let result = f(&mut state, &mut out);
        self.flush(out);
        result
    }

    fn flush(&self, out: Outbox) {
        for event in out.events {
            tracing::trace!(event = event.kind(), "Event");
            self.dispatcher.publish(event);
        }
        for request in out.requests {
            tracing::trace!(request = request.kind(), "Request");
            self.signaling.send(request);
        }
        for (after, timer) in out.timers {
            let tx = self.input_tx.clone();
            self.runtime.spawn(async move {
                tokio::time::sleep(after).await;
                let _ = tx.send(EngineInput::Timer(timer));
            });
        }
    }
}

struct EngineInner {
    shared: Arc<Shared>,
    driver: JoinHandle<()>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Client session engine
///
/// Cheap to clone; all clones share one state. Dropping the last clone stops
/// the engine's tasks and releases the signaling transport.
///
/// # Example
/// ```no_run
/// use rtc_session::engine::{Engine, EngineConfig};
/// use rtc_session::ids::User;
/// use rtc_session::publisher::PublishChannel;
/// use rtc_session::room::RoomConfig;
/// use rtc_session::signaling::loopback::LoopbackServer;
///
/// # async fn example() -> rtc_session::Result<()> {
/// let server = LoopbackServer::new();
/// let engine = Engine::new(EngineConfig::default(), server.connect())?;
///
/// let room = engine.login_room("r1", User::with_id("u1")?, RoomConfig::default())?;
/// room.start_publishing_stream("s1", PublishChannel::Main)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine on the current tokio runtime
    pub fn new(config: EngineConfig, signaling: impl Signaling) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        tracing::info!(
            app_id = config.app_id,
            scenario = ?config.scenario,
            version = Self::version(),
            "Creating engine"
        );

        let (dispatcher, delivery) = Dispatcher::new(config.max_event_handlers);
        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        signaling.attach(InboundSender::new(input_tx.clone()));

        let shared = Arc::new(Shared {
            state: Mutex::new(EngineState::new(config)),
            dispatcher,
            signaling: Box::new(signaling),
            input_tx,
            runtime: runtime.clone(),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let driver = runtime.spawn(async move {
            while let Some(input) = input_rx.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.with_state(|state, out| state.handle_input(input, out));
            }
        });
        runtime.spawn(delivery.run());

        Ok(Self {
            inner: Arc::new(EngineInner { shared, driver }),
        })
    }

    /// Library version
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    /// Run a public call against the state
    ///
    /// A local rejection is returned to the caller and also reported to
    /// observers through `on_debug_error`.
    pub(crate) fn call<R>(
        &self,
        func_name: &'static str,
        f: impl FnOnce(&mut EngineState, &mut Outbox) -> Result<R>,
    ) -> Result<R> {
        self.shared().with_state(|state, out| {
            if state.destroyed {
                return Err(Error::EngineDestroyed);
            }

            let result = f(state, out);
            if let Err(err) = &result {
                tracing::warn!(func = func_name, error = %err, "Call rejected");
                out.emit(Event::DebugError {
                    error_code: err.code(),
                    func_name: func_name.to_string(),
                    info: err.to_string(),
                });
            }
            result
        })
    }

    /// Read the state
    pub(crate) fn query<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        f(&self.shared().state.lock())
    }

    /// Tear down every room and mixer task without notifying observers
    ///
    /// Events already queued are still delivered; observers are dropped
    /// afterwards. Every later call fails with [`Error::EngineDestroyed`].
    pub fn destroy(&self) {
        self.shared().with_state(|state, out| {
            if !state.destroyed {
                state.destroy(out);
            }
        });
        self.shared().dispatcher.clear_after_pending();
    }

    pub fn is_destroyed(&self) -> bool {
        self.query(|state| state.destroyed)
    }

    // Observers

    /// Register an observer
    ///
    /// Registration is idempotent and the engine holds the observer weakly.
    pub fn add_event_handler<H: EventHandler + 'static>(&self, handler: &Arc<H>) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::EngineDestroyed);
        }
        self.shared().dispatcher.add(handler)
    }

    /// Unregister an observer; returns whether it was registered
    pub fn remove_event_handler<H: EventHandler + 'static>(&self, handler: &Arc<H>) -> bool {
        self.shared().dispatcher.remove(handler)
    }

    /// Number of registered observers
    pub fn event_handler_count(&self) -> usize {
        self.shared().dispatcher.len()
    }

    // Rooms

    /// Join a room
    ///
    /// The room is `Connecting` when this returns; `Connected` or
    /// `Disconnected` follows through `on_room_state_update`.
    pub fn login_room(&self, room_id: &str, user: User, config: RoomConfig) -> Result<Room> {
        self.login(room_id, user, config, None)
    }

    /// Join a room that requires an authentication token
    pub fn login_room_with_token(
        &self,
        room_id: &str,
        user: User,
        config: RoomConfig,
        token: impl Into<String>,
    ) -> Result<Room> {
        self.login(room_id, user, config, Some(token.into()))
    }

    fn login(&self, room_id: &str, user: User, config: RoomConfig, token: Option<String>) -> Result<Room> {
        let room_id = self.call("login_room", |state, out| {
            let room_id = RoomId::new(room_id)?;
            state.login(room_id.clone(), user, config, token, out);
            Ok(room_id)
        })?;
        Ok(Room::new(self.clone(), room_id))
    }

    /// Leave a room, stopping everything published or played in it
    pub fn logout_room(&self, room_id: &str) -> Result<()> {
        self.call("logout_room", |state, out| {
            state.logout(&RoomId::new(room_id)?, out);
            Ok(())
        })
    }

    /// Handle to a joined room
    pub fn room(&self, room_id: &str) -> Option<Room> {
        let room_id = RoomId::new(room_id).ok()?;
        self.query(|state| state.rooms.contains_key(&room_id))
            .then(|| Room::new(self.clone(), room_id))
    }

    /// Current state of a room; `Disconnected` for rooms not joined
    pub fn room_state(&self, room_id: &str) -> RoomState {
        let Ok(room_id) = RoomId::new(room_id) else {
            return RoomState::Disconnected;
        };
        self.query(|state| state.rooms.get(&room_id).map_or(RoomState::Disconnected, |r| r.state))
    }

    /// IDs of the joined rooms
    pub fn rooms(&self) -> Vec<RoomId> {
        self.query(|state| state.rooms.keys().cloned().collect())
    }

    // Publishing

    /// Stop the stream published on a channel
    ///
    /// Per-stream attributes (extra info, mute, watermark, CDN relays) are
    /// discarded and have to be set again for the next publish.
    pub fn stop_publishing_stream(&self, channel: PublishChannel) -> Result<()> {
        self.call("stop_publishing_stream", |state, out| {
            state.stop_publishing(channel, out);
            Ok(())
        })
    }

    pub fn publisher_state(&self, channel: PublishChannel) -> PublisherState {
        self.query(|state| state.publisher_state(channel))
    }

    pub fn publisher_info(&self, channel: PublishChannel) -> Option<PublisherInfo> {
        self.query(|state| state.publisher_info(channel))
    }

    /// Set the extra info of the channel's stream
    ///
    /// While nothing is published the value is staged for the next publish
    /// and the completion resolves to success at once.
    pub fn set_stream_extra_info(
        &self,
        extra_info: impl Into<String>,
        channel: PublishChannel,
    ) -> Result<Completion<ErrorCode>> {
        self.call("set_stream_extra_info", |state, out| {
            state.set_stream_extra_info(extra_info.into(), channel, out)
        })
    }

    pub fn mute_publish_stream_audio(&self, mute: bool, channel: PublishChannel) -> Result<()> {
        self.call("mute_publish_stream_audio", |state, out| {
            state.mute_publish(Some(mute), None, channel, out);
            Ok(())
        })
    }

    pub fn mute_publish_stream_video(&self, mute: bool, channel: PublishChannel) -> Result<()> {
        self.call("mute_publish_stream_video", |state, out| {
            state.mute_publish(None, Some(mute), channel, out);
            Ok(())
        })
    }

    /// Set or clear the watermark of the channel's stream
    pub fn set_publish_watermark(
        &self,
        watermark: Option<Watermark>,
        preview_visible: bool,
        channel: PublishChannel,
    ) -> Result<()> {
        self.call("set_publish_watermark", |state, _| {
            state.set_publish_watermark(watermark, preview_visible, channel);
            Ok(())
        })
    }

    /// Relay the channel's stream to a CDN
    pub fn add_publish_cdn_url(&self, url: impl Into<String>, channel: PublishChannel) -> Result<Completion<ErrorCode>> {
        self.call("add_publish_cdn_url", |state, out| {
            state.update_cdn_url(url.into(), true, channel, out)
        })
    }

    pub fn remove_publish_cdn_url(&self, url: impl Into<String>, channel: PublishChannel) -> Result<Completion<ErrorCode>> {
        self.call("remove_publish_cdn_url", |state, out| {
            state.update_cdn_url(url.into(), false, channel, out)
        })
    }

    /// Attach SEI to the channel's outgoing video
    pub fn send_sei(&self, data: impl Into<Bytes>, channel: PublishChannel) -> Result<()> {
        self.call("send_sei", |state, out| state.send_sei(data.into(), channel, out))
    }

    // Channel settings

    /// Start the local preview, or move it to another canvas
    pub fn start_preview(&self, canvas: Canvas, channel: PublishChannel) -> Result<()> {
        self.call("start_preview", |state, _| {
            state.start_preview(canvas, channel);
            Ok(())
        })
    }

    pub fn stop_preview(&self, channel: PublishChannel) -> Result<()> {
        self.call("stop_preview", |state, _| {
            state.stop_preview(channel);
            Ok(())
        })
    }

    /// Current settings of a channel
    pub fn channel_config(&self, channel: PublishChannel) -> ChannelConfig {
        self.query(|state| state.channels.config(channel).clone())
    }

    fn update_channel(
        &self,
        func_name: &'static str,
        channel: PublishChannel,
        f: impl FnOnce(&mut ChannelConfig),
    ) -> Result<()> {
        self.call(func_name, |state, _| {
            f(state.channels.config_mut(channel));
            Ok(())
        })
    }

    /// Set the encoder configuration; fps and bitrate must be non-zero
    pub fn set_video_config(&self, config: VideoConfig, channel: PublishChannel) -> Result<()> {
        self.call("set_video_config", |state, _| {
            if config.fps == 0 || config.bitrate == 0 {
                return Err(Error::InvalidParam(format!("video config {:?}", config)));
            }
            state.channels.config_mut(channel).video_config = config;
            Ok(())
        })
    }

    pub fn set_audio_config(&self, config: AudioConfig) -> Result<()> {
        self.update_channel("set_audio_config", PublishChannel::Main, |c| c.audio_config = config)
    }

    pub fn set_video_mirror_mode(&self, mode: MirrorMode, channel: PublishChannel) -> Result<()> {
        self.update_channel("set_video_mirror_mode", channel, |c| c.mirror_mode = mode)
    }

    /// Let the engine adapt the stream to the uplink
    pub fn enable_traffic_control(
        &self,
        enable: bool,
        property: TrafficControlProperty,
        channel: PublishChannel,
    ) -> Result<()> {
        self.update_channel("enable_traffic_control", channel, |c| {
            c.traffic_control = enable;
            c.traffic_control_property = property;
        })
    }

    pub fn set_min_video_bitrate_for_traffic_control(
        &self,
        bitrate: u32,
        mode: TrafficControlMinVideoBitrateMode,
        channel: PublishChannel,
    ) -> Result<()> {
        self.update_channel("set_min_video_bitrate_for_traffic_control", channel, |c| {
            c.min_video_bitrate = bitrate;
            c.min_video_bitrate_mode = mode;
        })
    }

    /// Set capture gain, clamped to `0..=100`
    pub fn set_capture_volume(&self, volume: u32) -> Result<()> {
        self.update_channel("set_capture_volume", PublishChannel::Main, |c| {
            c.capture_volume = volume.min(MAX_CAPTURE_VOLUME)
        })
    }

    pub fn enable_beautify(&self, feature: BeautifyFeature, channel: PublishChannel) -> Result<()> {
        self.update_channel("enable_beautify", channel, |c| c.beautify_feature = feature)
    }

    /// Set beautify strengths; each factor is clamped to `[0, 1]`
    pub fn set_beautify_option(&self, option: BeautifyOption, channel: PublishChannel) -> Result<()> {
        self.update_channel("set_beautify_option", channel, |c| {
            c.beautify_option = option.clamped()
        })
    }

    // Playing

    /// Stop playing a stream; its volume and mute settings are discarded
    pub fn stop_playing_stream(&self, stream_id: &str) -> Result<()> {
        self.call("stop_playing_stream", |state, out| {
            state.stop_playing(&StreamId::new(stream_id)?, out);
            Ok(())
        })
    }

    pub fn player_state(&self, stream_id: &str) -> PlayerState {
        let Ok(stream_id) = StreamId::new(stream_id) else {
            return PlayerState::NoPlay;
        };
        self.query(|state| state.player_state(&stream_id))
    }

    pub fn player_info(&self, stream_id: &str) -> Option<PlayerInfo> {
        let stream_id = StreamId::new(stream_id).ok()?;
        self.query(|state| state.player_info(&stream_id))
    }

    /// Set playback volume, clamped to `0..=100`
    pub fn set_play_volume(&self, stream_id: &str, volume: u32) -> Result<()> {
        self.call("set_play_volume", |state, _| {
            state.set_play_volume(&StreamId::new(stream_id)?, volume);
            Ok(())
        })
    }

    /// Mute a played stream's audio; no effect on CDN pulls
    pub fn mute_play_stream_audio(&self, stream_id: &str, mute: bool) -> Result<()> {
        self.call("mute_play_stream_audio", |state, _| {
            state.mute_play(&StreamId::new(stream_id)?, Some(mute), None);
            Ok(())
        })
    }

    /// Mute a played stream's video; no effect on CDN pulls
    pub fn mute_play_stream_video(&self, stream_id: &str, mute: bool) -> Result<()> {
        self.call("mute_play_stream_video", |state, _| {
            state.mute_play(&StreamId::new(stream_id)?, None, Some(mute));
            Ok(())
        })
    }

    // Mixing

    /// Ask the service to start (or update) a mixer task
    ///
    /// Inputs that do not exist yet are fine; the service waits for them.
    pub fn start_mixer_task(&self, task: MixerTask) -> Result<Completion<MixerStartResult>> {
        self.call("start_mixer_task", |state, out| state.start_mixer_task(task, out))
    }

    /// Ask the service to stop a mixer task
    ///
    /// Without a successor task the outputs may keep relaying until the
    /// task's inputs are gone; see [`Engine::mixer_task_phase`].
    pub fn stop_mixer_task(&self, task_id: &str) -> Result<Completion<ErrorCode>> {
        self.call("stop_mixer_task", |state, out| {
            Ok(state.stop_mixer_task(TaskId::new(task_id)?, out))
        })
    }

    pub fn mixer_task_phase(&self, task_id: &str) -> Option<MixerTaskPhase> {
        let task_id = TaskId::new(task_id).ok()?;
        self.query(|state| state.mixer.phase(&task_id))
    }

    /// Descriptor of a task this engine started
    pub fn mixer_task(&self, task_id: &str) -> Option<MixerTask> {
        let task_id = TaskId::new(task_id).ok()?;
        self.query(|state| state.mixer.task(&task_id).cloned())
    }

    pub fn mixer_relays(&self, task_id: &str) -> Vec<RelayCdnInfo> {
        let Ok(task_id) = TaskId::new(task_id) else {
            return Vec::new();
        };
        self.query(|state| state.mixer.relays(&task_id))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("handlers", &self.event_handler_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use crate::dispatch::EventChannel;
    use crate::signaling::Request;

    /// Records requests; never answers
    #[derive(Default)]
    struct Recorder {
        requests: Arc<StdMutex<Vec<Request>>>,
        inbound: Arc<StdMutex<Option<InboundSender>>>,
    }

    impl Signaling for Recorder {
        fn attach(&self, inbound: InboundSender) {
            *self.inbound.lock().unwrap() = Some(inbound);
        }

        fn send(&self, request: Request) {
            self.requests.lock().unwrap().push(request);
        }
    }

    #[test]
    fn test_requires_runtime() {
        let result = Engine::new(EngineConfig::default(), Recorder::default());
        assert!(matches!(result, Err(Error::NoRuntime)));
    }

    #[tokio::test]
    async fn test_invalid_room_id_reports_debug_error() {
        let engine = Engine::new(EngineConfig::default(), Recorder::default()).unwrap();
        let (observer, mut events) = EventChannel::new();
        engine.add_event_handler(&observer).unwrap();

        let result = engine.login_room("bad room", User::with_id("u1").unwrap(), RoomConfig::default());
        assert!(matches!(result, Err(Error::InvalidRoomId(_))));
        assert_eq!(engine.room_state("bad room"), RoomState::Disconnected);

        match events.recv().await {
            Some(Event::DebugError {
                error_code,
                func_name,
                ..
            }) => {
                assert_eq!(error_code, ErrorCode::ROOM_INVALID_ID);
                assert_eq!(func_name, "login_room");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_sends_request() {
        let recorder = Recorder::default();
        let requests = Arc::clone(&recorder.requests);
        let engine = Engine::new(EngineConfig::default(), recorder).unwrap();

        let room = engine
            .login_room("r1", User::with_id("u1").unwrap(), RoomConfig::default())
            .unwrap();
        assert_eq!(room.state(), RoomState::Connecting);
        assert!(matches!(
            &requests.lock().unwrap()[..],
            [Request::Login { .. }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_timeout_fires() {
        let engine = Engine::new(
            EngineConfig::default().login_timeout(Duration::from_secs(5)),
            Recorder::default(),
        )
        .unwrap();
        engine
            .login_room("r1", User::with_id("u1").unwrap(), RoomConfig::default())
            .unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(engine.room_state("r1"), RoomState::Disconnected);
    }

    #[tokio::test]
    async fn test_destroy() {
        let engine = Engine::new(EngineConfig::default(), Recorder::default()).unwrap();
        engine
            .login_room("r1", User::with_id("u1").unwrap(), RoomConfig::default())
            .unwrap();

        engine.destroy();
        assert!(engine.rooms().is_empty());
        assert_eq!(
            engine.logout_room("r1"),
            Err(Error::EngineDestroyed)
        );
        let (observer, _events) = EventChannel::new();
        assert_eq!(engine.add_event_handler(&observer), Err(Error::EngineDestroyed));
    }

    #[tokio::test]
    async fn test_channel_settings_clamped() {
        let engine = Engine::new(EngineConfig::default(), Recorder::default()).unwrap();

        engine.set_capture_volume(300).unwrap();
        engine
            .set_beautify_option(
                BeautifyOption {
                    polish_step: 2.0,
                    whiten_factor: -1.0,
                    sharpen_factor: 0.3,
                },
                PublishChannel::Aux,
            )
            .unwrap();

        assert_eq!(engine.channel_config(PublishChannel::Main).capture_volume, 100);
        let option = engine.channel_config(PublishChannel::Aux).beautify_option;
        assert_eq!(option.polish_step, 1.0);
        assert_eq!(option.whiten_factor, 0.0);
        assert!(engine
            .set_video_config(VideoConfig::default().fps(0), PublishChannel::Main)
            .is_err());
    }

    #[tokio::test]
    async fn test_invalid_video_config_rejected() {
        let engine = Engine::new(EngineConfig::default(), Recorder::default()).unwrap();
        let (observer, mut events) = EventChannel::new();
        engine.add_event_handler(&observer).unwrap();
        let before = engine.channel_config(PublishChannel::Main).video_config;

        let result = engine.set_video_config(VideoConfig::default().bitrate(0), PublishChannel::Main);
        assert!(matches!(result, Err(Error::InvalidParam(_))));
        assert_eq!(engine.channel_config(PublishChannel::Main).video_config, before);

        match events.recv().await {
            Some(Event::DebugError {
                error_code,
                func_name,
                ..
            }) => {
                assert_eq!(error_code, ErrorCode::INVALID_PARAM);
                assert_eq!(func_name, "set_video_config");
            }
            other => panic!("unexpected {:?}", other),
        }

        let config = VideoConfig::default().fps(24);
        engine.set_video_config(config, PublishChannel::Aux).unwrap();
        assert_eq!(engine.channel_config(PublishChannel::Aux).video_config, config);
    }
}
