mod common;

use common::{FakeEngine, FakeTokens};
use nevira_session::{
    DisconnectReason, EngineEvent, MarkerClassifier, MediaError, RoomOptions, SessionConfig,
    SessionController, SessionError, SessionHandle, Speaker,
};
use nevira_types::{ConnectionPhase, ConnectionQuality, Participant, UiState};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

fn start(
    config: SessionConfig,
    engine: &FakeEngine,
    tokens: &FakeTokens,
) -> (SessionHandle, JoinHandle<()>) {
    SessionController::spawn(
        config,
        engine.clone(),
        tokens.clone(),
        Arc::new(MarkerClassifier::default()),
    )
}

async fn connected(handle: &SessionHandle) -> UiState {
    handle.connect().await.unwrap();
    handle
        .wait_for(|s| s.phase == ConnectionPhase::Connected)
        .await
        .unwrap()
}

fn idle(state: &UiState) -> bool {
    state.phase == ConnectionPhase::Idle
}

#[tokio::test(start_paused = true)]
async fn connect_publishes_microphone_and_reports_connected() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);

    let state = connected(&handle).await;
    assert!(!state.muted);
    assert!(!state.agent_speaking);
    assert!(state.participants.is_empty());
    assert!(state.last_error.is_none());
    let identity = state.identity.expect("identity assigned on connect");
    assert!(identity.starts_with("user_"));

    assert_eq!(engine.microphone_calls(), vec![true]);
    assert_eq!(engine.connect_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_forwards_url_token_and_room_options() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let config = SessionConfig {
        livekit_url: "wss://nevira.livekit.cloud".to_string(),
        room_name: "support-room".to_string(),
        ..SessionConfig::default()
    };
    let (handle, _task) = start(config, &engine, &tokens);

    let state = connected(&handle).await;
    let identity = state.identity.unwrap();

    assert_eq!(
        tokens.requests(),
        vec![(identity.clone(), "support-room".to_string())]
    );
    let (url, token, options) = engine.connect_calls().remove(0);
    assert_eq!(url, "wss://nevira.livekit.cloud");
    assert_eq!(token, format!("token-for-{identity}"));
    assert_eq!(options, RoomOptions::default());
    assert!(options.adaptive_stream && options.dynacast);
}

#[tokio::test(start_paused = true)]
async fn agent_audio_raises_speaking_flag_for_three_seconds() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    engine.join("nevira-agent-1").await;
    engine.publish_audio("nevira-agent-1").await;
    let started = Instant::now();
    handle.wait_for(|s| s.agent_speaking).await.unwrap();
    assert_eq!(engine.attached(), vec!["TR_nevira-agent-1".to_string()]);

    handle.wait_for(|s| !s.agent_speaking).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(started.elapsed() < Duration::from_millis(3100));
}

#[tokio::test(start_paused = true)]
async fn second_agent_track_extends_the_window() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    engine.publish_audio("agent-7").await;
    let started = Instant::now();
    handle.wait_for(|s| s.agent_speaking).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    engine.publish_audio("agent-7").await;

    handle.wait_for(|s| !s.agent_speaking).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn human_audio_does_not_raise_agent_flag() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    engine.join("user_b").await;
    engine.publish_audio("user_b").await;
    handle
        .wait_for(|s| s.participants.len() == 1)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!handle.state().agent_speaking);
    assert_eq!(engine.attached(), vec!["TR_user_b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn roster_is_independent_of_join_order() {
    let mut rosters = Vec::new();
    for order in [["agent-nevira", "user_b"], ["user_b", "agent-nevira"]] {
        let engine = FakeEngine::new();
        let tokens = FakeTokens::new();
        let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
        connected(&handle).await;

        for identity in order {
            engine.join(identity).await;
        }
        let state = handle
            .wait_for(|s| s.participants.len() == 2)
            .await
            .unwrap();
        rosters.push(state.participants);
    }

    assert_eq!(rosters[0], rosters[1]);
    assert_eq!(
        rosters[0],
        vec![
            Participant {
                identity: "agent-nevira".to_string(),
                is_agent: true,
            },
            Participant {
                identity: "user_b".to_string(),
                is_agent: false,
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn departures_leave_the_roster() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    engine.join("agent-nevira").await;
    engine
        .emit(EngineEvent::ConnectionQualityChanged {
            identity: "agent-nevira".to_string(),
            quality: ConnectionQuality::Good,
        })
        .await;
    let state = handle
        .wait_for(|s| s.agent_present() && s.quality.contains_key("agent-nevira"))
        .await
        .unwrap();
    assert_eq!(state.quality["agent-nevira"], ConnectionQuality::Good);

    engine.leave("agent-nevira").await;
    let state = handle
        .wait_for(|s| s.participants.is_empty())
        .await
        .unwrap();
    assert!(state.quality.is_empty());
}

#[tokio::test(start_paused = true)]
async fn active_speakers_drive_local_speaking_flag() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    let identity = connected(&handle).await.identity.unwrap();

    engine
        .emit(EngineEvent::ActiveSpeakersChanged {
            speakers: vec![Speaker {
                identity,
                is_local: true,
            }],
        })
        .await;
    handle.wait_for(|s| s.locally_speaking).await.unwrap();

    engine
        .emit(EngineEvent::ActiveSpeakersChanged {
            speakers: vec![Speaker {
                identity: "agent-nevira".to_string(),
                is_local: false,
            }],
        })
        .await;
    handle.wait_for(|s| !s.locally_speaking).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn toggle_mute_round_trips_through_engine() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    handle.toggle_mute().await.unwrap();
    handle.wait_for(|s| s.muted).await.unwrap();
    handle.toggle_mute().await.unwrap();
    handle.wait_for(|s| !s.muted).await.unwrap();

    assert_eq!(engine.microphone_calls(), vec![true, false, true]);
}

#[tokio::test(start_paused = true)]
async fn toggle_mute_while_idle_is_ignored() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);

    handle.toggle_mute().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(engine.microphone_calls().is_empty());
    assert_eq!(handle.state(), UiState::default());
}

#[tokio::test(start_paused = true)]
async fn failed_toggle_keeps_mute_state_and_reports() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    engine.fail_microphone(Some(MediaError::Microphone("device busy".to_string())));
    handle.toggle_mute().await.unwrap();
    let state = handle
        .wait_for(|s| s.last_error.is_some())
        .await
        .unwrap();

    assert!(!state.muted);
    assert_eq!(state.phase, ConnectionPhase::Connected);
    assert_eq!(
        state.last_error.as_deref(),
        Some("microphone toggle failed: microphone unavailable: device busy")
    );
}

#[tokio::test(start_paused = true)]
async fn token_failure_returns_to_idle_without_opening_session() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::failing();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);

    handle.connect().await.unwrap();
    let state = handle
        .wait_for(|s| s.last_error.is_some())
        .await
        .unwrap();

    assert!(idle(&state));
    assert_eq!(
        state.last_error.as_deref(),
        Some("token server returned 503: token server unreachable")
    );
    assert!(engine.connect_calls().is_empty());
    assert_eq!(engine.disconnect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn engine_failure_releases_the_session() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    engine.fail_connect(MediaError::Unreachable("ws://localhost:7880".to_string()));
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);

    handle.connect().await.unwrap();
    let state = handle
        .wait_for(|s| s.last_error.is_some())
        .await
        .unwrap();

    assert!(idle(&state));
    assert!(state.identity.is_none());
    assert_eq!(
        state.last_error.as_deref(),
        Some("could not reach media server: ws://localhost:7880")
    );
    assert_eq!(engine.disconnect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_connect_while_connecting_requests_one_token() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    tokens.delay(Duration::from_secs(1));
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);

    handle.connect().await.unwrap();
    handle.connect().await.unwrap();
    handle.connect().await.unwrap();
    handle
        .wait_for(|s| s.phase == ConnectionPhase::Connected)
        .await
        .unwrap();
    handle.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(tokens.requests().len(), 1);
    assert_eq!(engine.connect_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_fetching_token_abandons_connect() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    tokens.delay(Duration::from_secs(1));
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);

    handle.connect().await.unwrap();
    handle
        .wait_for(|s| s.phase == ConnectionPhase::Connecting)
        .await
        .unwrap();
    handle.disconnect().await.unwrap();
    let state = handle.wait_for(idle).await.unwrap();

    assert!(state.last_error.is_none());
    assert!(engine.connect_calls().is_empty());
    assert_eq!(engine.disconnect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_opening_session_closes_it() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    engine.delay_connect(Duration::from_secs(1));
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);

    handle.connect().await.unwrap();
    handle
        .wait_for(|s| s.phase == ConnectionPhase::Connecting)
        .await
        .unwrap();
    handle.disconnect().await.unwrap();
    handle.wait_for(idle).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(engine.connect_calls().len(), 1);
    assert_eq!(engine.disconnect_calls(), 1);
    assert!(engine.microphone_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn user_disconnect_clears_session_state() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;
    engine.join("agent-nevira").await;
    engine.publish_audio("agent-nevira").await;
    handle
        .wait_for(|s| s.agent_speaking && s.agent_present())
        .await
        .unwrap();

    handle.disconnect().await.unwrap();
    let state = handle.wait_for(idle).await.unwrap();

    assert!(!state.agent_speaking);
    assert!(state.participants.is_empty());
    assert!(state.identity.is_none());
    assert!(state.last_error.is_none());
    assert_eq!(engine.disconnect_calls(), 1);

    // The cancelled window must not fire into a later session.
    connected(&handle).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.state().phase, ConnectionPhase::Connected);
}

#[tokio::test(start_paused = true)]
async fn platform_disconnect_reports_reason_and_allows_reconnect() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    let first = connected(&handle).await.identity.unwrap();
    engine.join("agent-nevira").await;
    handle.wait_for(|s| s.agent_present()).await.unwrap();

    engine
        .emit(EngineEvent::Disconnected {
            reason: Some(DisconnectReason::ParticipantRemoved),
        })
        .await;
    let state = handle.wait_for(idle).await.unwrap();
    assert_eq!(
        state.last_error.as_deref(),
        Some("disconnected: removed from the room")
    );
    assert!(state.participants.is_empty());
    assert_eq!(engine.disconnect_calls(), 1);

    let state = connected(&handle).await;
    assert!(state.last_error.is_none());
    assert_ne!(state.identity.unwrap(), first);
    assert_eq!(engine.connect_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn closed_event_stream_counts_as_lost_connection() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, _task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    engine.close_events();
    let state = handle.wait_for(idle).await.unwrap();

    assert_eq!(
        state.last_error.as_deref(),
        Some("disconnected: connection lost")
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_tears_down_and_stops_the_task() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(engine.disconnect_calls(), 1);
    assert_eq!(handle.connect().await, Err(SessionError::ControllerClosed));
}

#[tokio::test(start_paused = true)]
async fn connect_after_shutdown_never_opens_a_session() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    engine.delay_microphone(Duration::from_secs(1));
    handle.toggle_mute().await.unwrap();
    handle.shutdown().await.unwrap();
    let _ = handle.connect().await;
    task.await.unwrap();

    assert_eq!(engine.connect_calls().len(), 1);
    assert_eq!(engine.disconnect_calls(), 1);
    assert_eq!(tokens.requests().len(), 1);
    let state = handle.state();
    assert!(idle(&state));
    assert!(state.participants.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_tears_down() {
    let engine = FakeEngine::new();
    let tokens = FakeTokens::new();
    let (handle, task) = start(SessionConfig::default(), &engine, &tokens);
    connected(&handle).await;

    let other = handle.clone();
    drop(handle);
    drop(other);
    task.await.unwrap();

    assert_eq!(engine.disconnect_calls(), 1);
}
