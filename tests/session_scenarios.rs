//! End-to-end scenarios: engines talking to the loopback service

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use rtc_session::dispatch::{Event, EventChannel, EventHandler, ExtendedData};
use rtc_session::ids::{RoomId, StreamId, TaskId, User};
use rtc_session::media::Rect;
use rtc_session::mixer::{MixerInput, MixerInputContentType, MixerOutput, MixerTask};
use rtc_session::player::{PlayerConfig, PlayerState};
use rtc_session::publisher::{PublishChannel, PublisherState};
use rtc_session::relay::RelayCdnState;
use rtc_session::room::RoomState;
use rtc_session::signaling::loopback::{ClientId, LoopbackServer};
use rtc_session::{Engine, EngineConfig, ErrorCode};

struct Client {
    id: ClientId,
    engine: Engine,
    events: UnboundedReceiver<Event>,
    _observer: Arc<EventChannel>,
}

fn client(server: &LoopbackServer) -> Client {
    let signaling = server.connect();
    let id = signaling.id();
    let engine = Engine::new(EngineConfig::default(), signaling).unwrap();
    let (observer, events) = EventChannel::new();
    engine.add_event_handler(&observer).unwrap();
    Client {
        id,
        engine,
        events,
        _observer: observer,
    }
}

async fn wait_for(events: &mut UnboundedReceiver<Event>, mut pred: impl FnMut(&Event) -> bool) -> Event {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn room_state(event: &Event, want: RoomState) -> bool {
    matches!(event, Event::RoomStateUpdate { state, .. } if *state == want)
}

fn publisher_state(event: &Event, want: PublisherState) -> bool {
    matches!(event, Event::PublisherStateUpdate { state, .. } if *state == want)
}

fn player_state(event: &Event, want: PlayerState) -> bool {
    matches!(event, Event::PlayerStateUpdate { state, .. } if *state == want)
}

/// Let the driver and delivery tasks drain what is already queued
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn join(client: &mut Client, room: &str, user: &str) -> rtc_session::room::Room {
    let room = client
        .engine
        .login_room(room, User::with_id(user).unwrap(), Default::default())
        .unwrap();
    wait_for(&mut client.events, |e| room_state(e, RoomState::Connected)).await;
    room
}

async fn publish(client: &mut Client, room: &rtc_session::room::Room, stream: &str) {
    room.start_publishing_stream(stream, PublishChannel::Main).unwrap();
    wait_for(&mut client.events, |e| publisher_state(e, PublisherState::Publishing)).await;
}

#[tokio::test]
async fn test_logout_before_login_ack_leaks_nothing() {
    let server = LoopbackServer::new();
    let mut alice = client(&server);

    let room = alice
        .engine
        .login_room("r1", User::with_id("alice").unwrap(), Default::default())
        .unwrap();
    room.start_publishing_stream("s1", PublishChannel::Main).unwrap();
    room.start_playing_stream("s2", None, PlayerConfig::default()).unwrap();
    room.logout().unwrap();

    wait_for(&mut alice.events, |e| room_state(e, RoomState::Disconnected)).await;
    settle().await;

    assert_eq!(alice.engine.room_state("r1"), RoomState::Disconnected);
    assert_eq!(alice.engine.publisher_state(PublishChannel::Main), PublisherState::NoPublish);
    assert_eq!(alice.engine.player_state("s2"), PlayerState::NoPlay);
    assert!(alice.engine.rooms().is_empty());

    let room_id = RoomId::new("r1").unwrap();
    assert!(server.room_members(&room_id).is_empty());
    assert!(!server.has_stream(&StreamId::new("s1").unwrap()));

    // The late login ack never revives the room
    while let Ok(event) = alice.events.try_recv() {
        assert!(!room_state(&event, RoomState::Connected), "stale ack surfaced: {:?}", event);
    }
}

#[tokio::test]
async fn test_play_before_publish_reaches_playing() {
    let server = LoopbackServer::new();
    let mut alice = client(&server);
    let mut bob = client(&server);

    let bob_room = join(&mut bob, "r1", "bob").await;
    bob_room
        .start_playing_stream("s1", None, PlayerConfig::default())
        .unwrap();
    wait_for(&mut bob.events, |e| player_state(e, PlayerState::PlayRequesting)).await;

    let alice_room = join(&mut alice, "r1", "alice").await;
    publish(&mut alice, &alice_room, "s1").await;

    let event = wait_for(&mut bob.events, |e| {
        matches!(e, Event::PlayerStateUpdate { .. })
    })
    .await;
    match event {
        Event::PlayerStateUpdate {
            stream_id,
            state,
            error_code,
            ..
        } => {
            assert_eq!(stream_id.as_str(), "s1");
            assert_eq!(state, PlayerState::Playing);
            assert_eq!(error_code, ErrorCode::SUCCESS);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_stop_suppresses_late_success() {
    let server = LoopbackServer::new();
    let mut alice = client(&server);
    let room = join(&mut alice, "r1", "alice").await;

    server.hold(alice.id);
    room.start_publishing_stream("s1", PublishChannel::Main).unwrap();
    room.start_playing_stream("s9", None, PlayerConfig::default()).unwrap();
    alice.engine.stop_publishing_stream(PublishChannel::Main).unwrap();
    alice.engine.stop_playing_stream("s9").unwrap();
    wait_for(&mut alice.events, |e| publisher_state(e, PublisherState::NoPublish)).await;
    wait_for(&mut alice.events, |e| player_state(e, PlayerState::NoPlay)).await;

    server.release(alice.id);
    settle().await;

    assert_eq!(alice.engine.publisher_state(PublishChannel::Main), PublisherState::NoPublish);
    assert_eq!(alice.engine.player_state("s9"), PlayerState::NoPlay);
    while let Ok(event) = alice.events.try_recv() {
        assert!(
            !publisher_state(&event, PublisherState::Publishing) && !player_state(&event, PlayerState::Playing),
            "late success surfaced: {:?}",
            event
        );
    }
}

struct Labelled {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    /// Set for the observer that removes itself on its first event
    remove_from: Mutex<Option<(Engine, Arc<Labelled>)>>,
}

impl EventHandler for Labelled {
    fn on_room_state_update(
        &self,
        state: RoomState,
        _error_code: ErrorCode,
        _extended_data: &ExtendedData,
        _room_id: &RoomId,
    ) {
        self.log.lock().unwrap().push(format!("{}:{:?}", self.label, state));
        if let Some((engine, me)) = self.remove_from.lock().unwrap().take() {
            assert!(engine.remove_event_handler(&me));
        }
    }
}

#[tokio::test]
async fn test_observers_called_in_order_and_removal_takes_effect() {
    let server = LoopbackServer::new();
    let mut alice = client(&server);
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::new(Labelled {
        label: "A",
        log: log.clone(),
        remove_from: Mutex::new(None),
    });
    let second = Arc::new(Labelled {
        label: "B",
        log: log.clone(),
        remove_from: Mutex::new(None),
    });
    *first.remove_from.lock().unwrap() = Some((alice.engine.clone(), first.clone()));
    alice.engine.add_event_handler(&first).unwrap();
    alice.engine.add_event_handler(&second).unwrap();

    join(&mut alice, "r1", "alice").await;
    settle().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["A:Connecting", "B:Connecting", "B:Connected"]
    );
}

fn mix_task(input: &str) -> MixerTask {
    MixerTask::new("t1")
        .unwrap()
        .input(MixerInput::new(
            StreamId::new(input).unwrap(),
            MixerInputContentType::Video,
            Rect::new(0, 0, 360, 640),
        ))
        .output(MixerOutput::new("rtmp://cdn/live/mix"))
}

#[tokio::test(start_paused = true)]
async fn test_mixer_keeps_relaying_through_input_grace() {
    let server = LoopbackServer::new();
    let mut alice = client(&server);
    let room = join(&mut alice, "r1", "alice").await;

    // The input does not exist yet; the task still starts
    let result = alice.engine.start_mixer_task(mix_task("s1")).unwrap().await;
    assert_eq!(result.error_code, ErrorCode::SUCCESS);
    wait_for(&mut alice.events, |e| matches!(e, Event::MixerRelayCdnStateUpdate { .. })).await;

    publish(&mut alice, &room, "s1").await;
    alice.engine.stop_publishing_stream(PublishChannel::Main).unwrap();
    settle().await;

    let task_id = TaskId::new("t1").unwrap();
    tokio::time::advance(Duration::from_secs(60)).await;
    server.sweep();
    settle().await;
    assert_eq!(server.mixer_inputs(&task_id), Some(vec![StreamId::new("s1").unwrap()]));
    assert!(alice
        .engine
        .mixer_relays("t1")
        .iter()
        .all(|info| info.state == RelayCdnState::Start));

    tokio::time::advance(Duration::from_secs(31)).await;
    server.sweep();
    let event = wait_for(&mut alice.events, |e| matches!(e, Event::MixerRelayCdnStateUpdate { .. })).await;
    match event {
        Event::MixerRelayCdnStateUpdate { infos, .. } => {
            assert!(infos.iter().all(|info| info.state == RelayCdnState::Stop));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(server.mixer_inputs(&task_id), Some(Vec::new()));
}

#[tokio::test]
async fn test_duplicate_login_kicks_first_session() {
    let server = LoopbackServer::new();
    let mut first = client(&server);
    let mut second = client(&server);

    let room = join(&mut first, "r1", "u1").await;
    publish(&mut first, &room, "s1").await;

    join(&mut second, "r1", "u1").await;

    let event = wait_for(&mut first.events, |e| publisher_state(e, PublisherState::NoPublish)).await;
    assert!(matches!(
        event,
        Event::PublisherStateUpdate { error_code, .. } if error_code == ErrorCode::ROOM_KICKED_LOGIN_ELSEWHERE
    ));
    let event = wait_for(&mut first.events, |e| room_state(e, RoomState::Disconnected)).await;
    assert!(matches!(
        event,
        Event::RoomStateUpdate { error_code, .. } if error_code == ErrorCode::ROOM_KICKED_LOGIN_ELSEWHERE
    ));
    assert_eq!(first.engine.room_state("r1"), RoomState::Disconnected);
    assert!(!server.has_stream(&StreamId::new("s1").unwrap()));
}

#[tokio::test]
async fn test_extra_info_reaches_player_without_state_change() {
    let server = LoopbackServer::new();
    let mut alice = client(&server);
    let mut bob = client(&server);

    let alice_room = join(&mut alice, "r1", "alice").await;
    publish(&mut alice, &alice_room, "s1").await;

    let bob_room = join(&mut bob, "r1", "bob").await;
    bob_room
        .start_playing_stream("s1", None, PlayerConfig::default())
        .unwrap();
    wait_for(&mut bob.events, |e| player_state(e, PlayerState::Playing)).await;

    let code = alice
        .engine
        .set_stream_extra_info("v2", PublishChannel::Main)
        .unwrap()
        .await;
    assert_eq!(code, ErrorCode::SUCCESS);

    let mut seen = Vec::new();
    let event = wait_for(&mut bob.events, |e| {
        seen.push(e.kind());
        matches!(e, Event::RoomStreamExtraInfoUpdate { .. })
    })
    .await;
    match event {
        Event::RoomStreamExtraInfoUpdate { streams, .. } => {
            assert_eq!(streams.len(), 1);
            assert_eq!(streams[0].extra_info, "v2");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!seen.contains(&"player_state_update"));
    assert_eq!(bob.engine.player_state("s1"), PlayerState::Playing);
}

#[tokio::test]
async fn test_sessions_resume_after_link_restored() {
    let server = LoopbackServer::new();
    let mut alice = client(&server);
    let room = join(&mut alice, "r1", "alice").await;
    publish(&mut alice, &room, "s1").await;

    server.interrupt(alice.id);
    wait_for(&mut alice.events, |e| room_state(e, RoomState::Connecting)).await;
    wait_for(&mut alice.events, |e| publisher_state(e, PublisherState::PublishRequesting)).await;

    server.restore(alice.id);
    wait_for(&mut alice.events, |e| room_state(e, RoomState::Connected)).await;
    wait_for(&mut alice.events, |e| publisher_state(e, PublisherState::Publishing)).await;

    assert_eq!(alice.engine.room_state("r1"), RoomState::Connected);
    assert!(server.has_stream(&StreamId::new("s1").unwrap()));
}
