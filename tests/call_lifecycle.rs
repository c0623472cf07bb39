//! End-to-End Szenarien über das In-Process Mesh

use agentic_call::media::{
    ManualFrames, MediaPipeline, MediaSettings, MemoryClipboard, SyntheticMedia,
};
use agentic_call::session::{
    CallDirection, CallPhase, Command, SessionConfig, SessionController, SessionError,
    StatusKind, CALL_ENDED,
};
use agentic_call::transport::LocalMesh;
use agentic_call::AgentId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// HELPERS
// ============================================================================

struct Agent {
    controller: SessionController<LocalMesh>,
    media: Arc<SyntheticMedia>,
    frames: ManualFrames,
    id: AgentId,
}

fn controller(
    mesh: &LocalMesh,
    media: &Arc<SyntheticMedia>,
    frames: &ManualFrames,
) -> SessionController<LocalMesh> {
    let pipeline = MediaPipeline::new(media.clone(), MediaSettings::default())
        .with_scheduler(Arc::new(frames.clone()));
    SessionController::new(SessionConfig::default(), mesh.clone(), pipeline)
}

async fn ready_agent(mesh: &LocalMesh, media: SyntheticMedia) -> Agent {
    let media = Arc::new(media);
    let frames = ManualFrames::new();
    let mut controller = controller(mesh, &media, &frames);

    let id = controller.initialize().await.unwrap();
    controller.process_next_event().await.unwrap().unwrap();
    assert_eq!(controller.status().kind, StatusKind::Ready);

    Agent {
        controller,
        media,
        frames,
        id,
    }
}

async fn agent(mesh: &LocalMesh) -> Agent {
    ready_agent(mesh, SyntheticMedia::tone(440.0, 0.3)).await
}

/// Verarbeitet alle anstehenden Events
async fn pump(controller: &mut SessionController<LocalMesh>) {
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(10), controller.next_event()).await
    {
        let _ = controller.handle_event(event).await;
    }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// B ruft A an, beide Seiten sind danach `in-call`
async fn connect(a: &mut Agent, b: &mut Agent) {
    b.controller.place_call(a.id.as_str()).await.unwrap();
    pump(&mut a.controller).await;
    pump(&mut b.controller).await;
    assert_eq!(a.controller.status().kind, StatusKind::InCall);
    assert_eq!(b.controller.status().kind, StatusKind::InCall);
}

// ============================================================================
// CALL LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_call_state_sequences() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;

    // B: ready -> calling, bevor der Transport antwortet
    b.controller.place_call(a.id.as_str()).await.unwrap();
    assert_eq!(b.controller.status().kind, StatusKind::Calling);
    assert_eq!(
        b.controller.status().message,
        format!("Calling {}...", a.id)
    );

    // A: ready -> incoming (automatisch angenommen)
    let event = a.controller.next_event().await.unwrap();
    a.controller.handle_event(event).await.unwrap();
    let status = a.controller.status();
    assert_eq!(status.kind, StatusKind::Incoming);
    assert_eq!(status.message, format!("Incoming call from {}...", b.id));

    // A: incoming -> in-call mit dem Remote-Stream
    a.controller.process_next_event().await.unwrap().unwrap();
    assert_eq!(a.controller.status().kind, StatusKind::InCall);
    assert_eq!(a.controller.status().message, format!("In call with {}", b.id));

    // B: calling -> in-call erst nach dem Remote-Stream
    assert_eq!(b.controller.status().kind, StatusKind::Calling);
    b.controller.process_next_event().await.unwrap().unwrap();
    assert_eq!(b.controller.status().kind, StatusKind::InCall);

    let a_call = a.controller.active_call().unwrap();
    assert_eq!(a_call.direction(), CallDirection::Inbound);
    assert_eq!(a_call.phase(), CallPhase::Connected);
    let b_call = b.controller.active_call().unwrap();
    assert_eq!(b_call.direction(), CallDirection::Outbound);
    assert_eq!(b_call.remote_id(), a.id.as_str());

    assert!(a.media.attached_remote().is_some());
    assert_eq!(mesh.calls_placed(), 1);
    assert_eq!(mesh.active_calls(), 1);
}

#[tokio::test]
async fn test_mic_level_during_call() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;
    connect(&mut a, &mut b).await;

    settle().await;
    assert_eq!(a.frames.waiting(), 1);
    assert_eq!(b.frames.waiting(), 1);

    // Synthetisches Mikrofon liefert alle 20ms einen Frame
    tokio::time::sleep(Duration::from_millis(60)).await;
    a.frames.tick();
    settle().await;

    assert!(a.controller.mic_level() > 0.0);
    assert!(*a.controller.subscribe_mic_level().borrow() > 0.0);
    assert_eq!(a.frames.waiting(), 1);
}

#[tokio::test]
async fn test_hangup_ends_call_on_both_sides() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;
    connect(&mut a, &mut b).await;

    assert!(b.controller.end_call());
    assert_eq!(b.controller.status().kind, StatusKind::Ready);
    assert_eq!(b.controller.status().message, CALL_ENDED);

    pump(&mut a.controller).await;
    assert_eq!(a.controller.status().kind, StatusKind::Ready);
    assert_eq!(a.controller.status().message, CALL_ENDED);

    for agent in [&a, &b] {
        assert!(!agent.controller.has_active_call());
        assert_eq!(agent.controller.mic_level(), 0.0);
        assert!(agent.controller.media().local_stream().is_none());
        assert!(agent.media.issued_tracks().iter().all(|t| !t.is_live()));
        assert_eq!(agent.media.attached_remote(), None);
    }
    assert_eq!(mesh.active_calls(), 0);
}

#[tokio::test]
async fn test_end_call_is_noop_without_session() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;

    assert!(!a.controller.end_call());
    assert_eq!(a.controller.status().kind, StatusKind::Ready);
    assert!(a.controller.status().message.starts_with("Ready. Your ID is"));

    connect(&mut a, &mut b).await;
    assert!(a.controller.end_call());
    assert!(!a.controller.end_call());
    assert_eq!(a.controller.status().message, CALL_ENDED);
}

#[tokio::test]
async fn test_callee_can_hang_up() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;
    connect(&mut a, &mut b).await;

    assert!(a.controller.end_call());
    pump(&mut b.controller).await;
    assert_eq!(b.controller.status().message, CALL_ENDED);
    assert!(!b.controller.has_active_call());
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_blank_id_never_reaches_transport() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;

    let err = a.controller.place_call("   ").await.unwrap_err();
    assert_eq!(err, SessionError::InvalidInput);

    let status = a.controller.status();
    assert_eq!(status.kind, StatusKind::Error);
    assert_eq!(status.message, "Please enter a remote agent ID");
    assert_eq!(mesh.calls_placed(), 0);
    assert_eq!(a.media.requests(), 0);
    assert!(!a.controller.has_active_call());
}

#[tokio::test]
async fn test_call_before_initialize() {
    let mesh = LocalMesh::new();
    let media = Arc::new(SyntheticMedia::silence());
    let frames = ManualFrames::new();
    let mut controller = controller(&mesh, &media, &frames);

    let err = controller.place_call("agentic-ab12-cd34").await.unwrap_err();
    assert_eq!(err, SessionError::NotInitialized);
    assert!(controller.status().is_error());
    assert_eq!(mesh.calls_placed(), 0);
    assert_eq!(media.requests(), 0);
}

#[tokio::test]
async fn test_permission_denied_on_place_call() {
    let mesh = LocalMesh::new();
    let a = agent(&mesh).await;
    let mut b = ready_agent(&mesh, SyntheticMedia::tone(440.0, 0.3).deny_permission()).await;

    let err = b.controller.place_call(a.id.as_str()).await.unwrap_err();
    assert!(matches!(err, SessionError::PermissionDenied(_)));

    let status = b.controller.status();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.message.starts_with("Microphone access failed"));
    assert!(!b.controller.has_active_call());
    assert!(b.controller.media().local_stream().is_none());
    assert_eq!(mesh.calls_placed(), 0);
}

#[tokio::test]
async fn test_missing_audio_context_on_place_call() {
    let mesh = LocalMesh::new();
    let a = agent(&mesh).await;
    let mut b = ready_agent(
        &mesh,
        SyntheticMedia::tone(440.0, 0.3).without_audio_context(),
    )
    .await;

    let err = b.controller.place_call(a.id.as_str()).await.unwrap_err();
    assert!(matches!(err, SessionError::UnsupportedEnvironment(_)));
    assert!(b.media.issued_tracks().iter().all(|t| !t.is_live()));
    assert_eq!(mesh.calls_placed(), 0);
}

#[tokio::test]
async fn test_callee_permission_denied_closes_inbound_call() {
    let mesh = LocalMesh::new();
    let mut a = ready_agent(&mesh, SyntheticMedia::silence().deny_permission()).await;
    let mut b = agent(&mesh).await;

    b.controller.place_call(a.id.as_str()).await.unwrap();

    let event = a.controller.next_event().await.unwrap();
    let err = a.controller.handle_event(event).await.unwrap_err();
    assert!(matches!(err, SessionError::PermissionDenied(_)));
    assert!(a.controller.status().is_error());
    assert!(!a.controller.has_active_call());

    let call_id = mesh.calls_between(b.id.as_str(), a.id.as_str())[0];
    assert_eq!(mesh.close_requests(&call_id), 1);

    pump(&mut b.controller).await;
    assert_eq!(b.controller.status().kind, StatusKind::Ready);
    assert_eq!(b.controller.status().message, CALL_ENDED);
    assert_eq!(b.controller.mic_level(), 0.0);
}

#[tokio::test]
async fn test_unknown_peer_fails_call() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;

    let err = a.controller.place_call("agentic-0000-0000").await.unwrap_err();
    assert!(matches!(err, SessionError::Call(_)));

    let status = a.controller.status();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.message.contains("Could not connect to peer"));
    assert!(!a.controller.has_active_call());
    assert!(a.controller.media().local_stream().is_none());
    assert!(a.media.issued_tracks().iter().all(|t| !t.is_live()));
    assert_eq!(mesh.calls_placed(), 1);
}

#[tokio::test]
async fn test_call_error_tears_down_both_sides() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;
    connect(&mut a, &mut b).await;

    assert!(mesh.fail_call(a.id.as_str(), "ICE connection failed"));
    pump(&mut a.controller).await;
    pump(&mut b.controller).await;

    for agent in [&a, &b] {
        let status = agent.controller.status();
        assert_eq!(status.kind, StatusKind::Error);
        assert_eq!(status.message, "Call failed: ICE connection failed");
        assert!(!agent.controller.has_active_call());
        assert_eq!(agent.controller.mic_level(), 0.0);
    }
}

#[tokio::test]
async fn test_transport_error_is_surfaced() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;

    assert!(mesh.report_error(a.id.as_str(), "server-error"));
    pump(&mut a.controller).await;

    let status = a.controller.status();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.message.contains("server-error"));
}

#[tokio::test]
async fn test_transport_error_tears_down_running_call() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;
    connect(&mut a, &mut b).await;

    assert!(mesh.report_error(a.id.as_str(), "server-error"));
    pump(&mut a.controller).await;

    let status = a.controller.status();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.message.contains("server-error"));
    assert!(!a.controller.has_active_call());
    assert_eq!(a.controller.mic_level(), 0.0);
    assert!(a.controller.media().local_stream().is_none());
    assert!(a.media.issued_tracks().iter().all(|t| !t.is_live()));

    pump(&mut b.controller).await;
    assert_eq!(b.controller.status().kind, StatusKind::Ready);
    assert_eq!(b.controller.status().message, CALL_ENDED);
    assert!(!b.controller.has_active_call());
    assert_eq!(mesh.active_calls(), 0);
}

// ============================================================================
// RECONNECT / SUPERSEDE / SHUTDOWN
// ============================================================================

#[tokio::test]
async fn test_disconnect_triggers_single_reconnect() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;

    assert!(mesh.disconnect(a.id.as_str()));

    let result = a.controller.process_next_event().await.unwrap();
    assert_eq!(result, Err(SessionError::TransportDisconnected));
    let status = a.controller.status();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.message.contains("Reconnecting"));
    assert_eq!(mesh.reconnect_requests(a.id.as_str()), 1);

    pump(&mut a.controller).await;
    assert_eq!(a.controller.status().kind, StatusKind::Ready);
    assert!(!a.controller.is_reconnecting());
    assert!(mesh.is_online(a.id.as_str()));
    assert_eq!(mesh.reconnect_requests(a.id.as_str()), 1);
}

#[tokio::test]
async fn test_disconnect_keeps_running_call() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;
    connect(&mut a, &mut b).await;

    mesh.disconnect(a.id.as_str());
    pump(&mut a.controller).await;

    assert!(a.controller.has_active_call());
    assert_eq!(a.controller.status().kind, StatusKind::InCall);
}

#[tokio::test]
async fn test_new_call_supersedes_previous() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let b = agent(&mesh).await;
    let c = agent(&mesh).await;

    a.controller.place_call(b.id.as_str()).await.unwrap();
    let first = mesh.calls_between(a.id.as_str(), b.id.as_str())[0];

    a.controller.place_call(c.id.as_str()).await.unwrap();

    assert_eq!(mesh.close_requests(&first), 1);
    assert_eq!(a.controller.active_remote(), Some(c.id.as_str()));
    assert_eq!(mesh.calls_between(a.id.as_str(), c.id.as_str()).len(), 1);
    assert_eq!(mesh.active_calls(), 1);
    // Ein neuer Stream für den neuen Anruf
    assert_eq!(a.media.requests(), 2);
}

#[tokio::test]
async fn test_shutdown_mid_call() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;
    connect(&mut a, &mut b).await;

    a.controller.shutdown();
    a.controller.shutdown();

    assert!(!mesh.is_online(a.id.as_str()));
    assert!(!a.controller.has_active_call());
    assert_eq!(a.controller.mic_level(), 0.0);

    pump(&mut b.controller).await;
    assert_eq!(b.controller.status().message, CALL_ENDED);
}

#[tokio::test]
async fn test_drop_tears_down_call() {
    let mesh = LocalMesh::new();
    let mut a = agent(&mesh).await;
    let mut b = agent(&mesh).await;
    connect(&mut a, &mut b).await;

    let a_id = a.id.clone();
    let a_media = a.media.clone();
    drop(a);

    assert!(!mesh.is_online(a_id.as_str()));
    assert!(a_media.issued_tracks().iter().all(|t| !t.is_live()));

    pump(&mut b.controller).await;
    assert_eq!(b.controller.status().message, CALL_ENDED);
}

// ============================================================================
// COPY ID
// ============================================================================

#[tokio::test]
async fn test_copy_agent_id() {
    let mesh = LocalMesh::new();
    let media = Arc::new(SyntheticMedia::silence());
    let clipboard = Arc::new(MemoryClipboard::new());
    let mut controller =
        controller(&mesh, &media, &ManualFrames::new()).with_clipboard(clipboard.clone());

    assert_eq!(controller.copy_agent_id(), Err(SessionError::NotInitialized));

    let id = controller.initialize().await.unwrap();
    controller.process_next_event().await;

    controller.copy_agent_id().unwrap();
    assert_eq!(clipboard.contents().as_deref(), Some(id.as_str()));
    assert_eq!(controller.status().kind, StatusKind::Ready);
}

#[tokio::test]
async fn test_copy_agent_id_failure_is_not_fatal() {
    let mesh = LocalMesh::new();
    let media = Arc::new(SyntheticMedia::silence());
    let mut controller = controller(&mesh, &media, &ManualFrames::new())
        .with_clipboard(Arc::new(MemoryClipboard::unavailable()));
    controller.initialize().await.unwrap();
    controller.process_next_event().await;

    let err = controller.copy_agent_id().unwrap_err();
    assert!(matches!(err, SessionError::Clipboard(_)));
    assert!(controller.status().message.starts_with("Failed to copy ID"));
    assert!(controller.is_connected());
}

// ============================================================================
// COMMAND LOOP
// ============================================================================

#[tokio::test]
async fn test_run_loop_drives_call() {
    let mesh = LocalMesh::new();
    let a = agent(&mesh).await;
    let b = agent(&mesh).await;

    let mut a_status = a.controller.subscribe_status();
    let mut b_status = b.controller.subscribe_status();
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let a_task = tokio::spawn(a.controller.run(a_rx));
    let b_task = tokio::spawn(b.controller.run(b_rx));

    b_tx.send(Command::PlaceCall(a.id.to_string())).unwrap();

    let timeout = Duration::from_secs(2);
    tokio::time::timeout(timeout, a_status.wait_for(|s| s.kind == StatusKind::InCall))
        .await
        .unwrap()
        .unwrap();
    tokio::time::timeout(timeout, b_status.wait_for(|s| s.kind == StatusKind::InCall))
        .await
        .unwrap()
        .unwrap();

    b_tx.send(Command::EndCall).unwrap();
    tokio::time::timeout(timeout, a_status.wait_for(|s| s.message == CALL_ENDED))
        .await
        .unwrap()
        .unwrap();

    a_tx.send(Command::Shutdown).unwrap();
    drop(b_tx);
    a_task.await.unwrap();
    b_task.await.unwrap();

    assert!(!mesh.is_online(a.id.as_str()));
    assert!(!mesh.is_online(b.id.as_str()));
}
