//! Session Controller
//!
//! Besitzt die lokale Identität, die Verbindung zum Mesh, den einzigen
//! aktiven Anruf und das Status-Modell. Vermittelt zwischen Transport,
//! Media Pipeline und Darstellung.
//!
//! Ablauf eines Anrufs:
//! ```text
//! ready → calling → in-call       (ausgehend)
//! ready → incoming → in-call      (eingehend, automatisch angenommen)
//! in-call → ready ("Call ended")  (Auflegen, egal von welcher Seite)
//! ```

use super::error::SessionError;
use super::status::{Status, StatusKind};
use crate::identity::{AgentId, DEFAULT_PREFIX};
use crate::media::{Clipboard, MediaPipeline, MemoryClipboard};
use crate::transport::{
    CallEvent, CallEvents, CallHandle, CallLink, CallOf, PeerEvent, PeerEvents, PeerHandle,
    PeerOptions, Transport,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

// ============================================================================
// TYPES
// ============================================================================

/// Konfiguration des Controllers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub id_prefix: String,
    pub peer: PeerOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_PREFIX.to_string(),
            peer: PeerOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Outbound,
    Inbound,
}

/// Fortschritt eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Ausgehend, wartet auf den Remote-Stream
    Dialing,
    /// Eingehend angenommen, wartet auf den Remote-Stream
    Answering,
    /// Remote-Stream ist angekommen
    Connected,
}

/// Der aktive Anruf
#[derive(Debug)]
pub struct CallSession<C> {
    remote_id: String,
    direction: CallDirection,
    phase: CallPhase,
    handle: C,
    events: CallEvents,
    opened_at: Instant,
}

impl<C> CallSession<C> {
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn handle(&self) -> &C {
        &self.handle
    }

    pub fn duration(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

/// Aktionen der Darstellung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PlaceCall(String),
    EndCall,
    CopyId,
    Shutdown,
}

/// Event vom Transport (Verbindung oder aktiver Anruf)
#[derive(Debug)]
pub enum ControllerEvent<C> {
    Peer(PeerEvent<C>),
    Call(CallEvent),
}

// ============================================================================
// SESSION CONTROLLER
// ============================================================================

pub struct SessionController<T: Transport> {
    config: SessionConfig,
    transport: T,
    identity: Option<AgentId>,
    peer: Option<T::Peer>,
    peer_events: Option<PeerEvents<CallOf<T::Peer>>>,
    call: Option<CallSession<CallOf<T::Peer>>>,
    media: MediaPipeline,
    clipboard: Arc<dyn Clipboard>,
    status_tx: watch::Sender<Status>,
    reconnecting: bool,
    shut_down: bool,
}

impl<T: Transport> SessionController<T> {
    pub fn new(config: SessionConfig, transport: T, media: MediaPipeline) -> Self {
        let (status_tx, _) = watch::channel(Status::initializing());

        Self {
            config,
            transport,
            identity: None,
            peer: None,
            peer_events: None,
            call: None,
            media,
            clipboard: Arc::new(MemoryClipboard::new()),
            status_tx,
            reconnecting: false,
            shut_down: false,
        }
    }

    /// Ersetzt die Zwischenablage
    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    // ------------------------------------------------------------------------
    // Observer
    // ------------------------------------------------------------------------

    pub fn identity(&self) -> Option<&AgentId> {
        self.identity.as_ref()
    }

    pub fn status(&self) -> Status {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_mic_level(&self) -> watch::Receiver<f32> {
        self.media.subscribe_mic_level()
    }

    pub fn mic_level(&self) -> f32 {
        self.media.mic_level()
    }

    pub fn media(&self) -> &MediaPipeline {
        &self.media
    }

    pub fn active_call(&self) -> Option<&CallSession<CallOf<T::Peer>>> {
        self.call.as_ref()
    }

    pub fn has_active_call(&self) -> bool {
        self.call.is_some()
    }

    pub fn active_remote(&self) -> Option<&str> {
        self.call.as_ref().map(CallSession::remote_id)
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Erzeugt die Identität (einmalig) und öffnet die Verbindung zum Mesh
    ///
    /// `ready` folgt erst mit dem `Open`-Event des Transports.
    pub async fn initialize(&mut self) -> Result<AgentId, SessionError> {
        if self.shut_down {
            return Err(SessionError::ShutDown);
        }

        let identity = match self.identity.clone() {
            Some(identity) => identity,
            None => {
                let identity = AgentId::generate(&self.config.id_prefix)
                    .map_err(|e| self.fail(e.into()))?;
                self.identity = Some(identity.clone());
                identity
            }
        };

        if self.peer.is_some() {
            tracing::debug!("Already connected as {}", identity);
            return Ok(identity);
        }

        self.set_status(Status::initializing());
        tracing::info!("Opening mesh connection as {}", identity);

        let (peer, events) = self
            .transport
            .open(&identity, &self.config.peer)
            .await
            .map_err(|e| self.fail(SessionError::TransportInit(e)))?;

        self.peer = Some(peer);
        self.peer_events = Some(events);
        self.reconnecting = false;

        Ok(identity)
    }

    /// Ruft einen anderen Agent an
    pub async fn place_call(&mut self, remote_id: &str) -> Result<(), SessionError> {
        let remote_id = remote_id.trim();
        if remote_id.is_empty() {
            return Err(self.fail(SessionError::InvalidInput));
        }
        if self.peer.is_none() {
            return Err(self.fail(SessionError::NotInitialized));
        }

        self.release_session(true);

        let stream = match self.media.ensure_local_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                self.media.teardown();
                return Err(self.fail(e.into()));
            }
        };

        self.set_status(Status::calling(remote_id));

        let Some(peer) = self.peer.as_ref() else {
            self.media.teardown();
            return Err(self.fail(SessionError::NotInitialized));
        };

        let link = match peer.call(remote_id, &stream).await {
            Ok(link) => link,
            Err(e) => {
                self.media.teardown();
                return Err(self.fail(SessionError::Call(e.to_string())));
            }
        };

        self.open_session(remote_id, CallDirection::Outbound, CallPhase::Dialing, link);
        Ok(())
    }

    /// Nimmt einen eingehenden Anruf automatisch an
    pub async fn handle_incoming_call(
        &mut self,
        link: CallLink<CallOf<T::Peer>>,
    ) -> Result<(), SessionError> {
        let remote_id = link.handle.remote_id().to_string();

        if self.peer.is_none() {
            tracing::warn!("Rejecting call from {}: no mesh connection", remote_id);
            link.handle.close();
            return Err(SessionError::NotInitialized);
        }

        self.release_session(true);
        self.set_status(Status::incoming(&remote_id));

        let stream = match self.media.ensure_local_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                link.handle.close();
                self.media.teardown();
                return Err(self.fail(e.into()));
            }
        };

        if let Err(e) = link.handle.answer(&stream).await {
            link.handle.close();
            self.media.teardown();
            return Err(self.fail(SessionError::Call(e.to_string())));
        }

        self.open_session(&remote_id, CallDirection::Inbound, CallPhase::Answering, link);
        Ok(())
    }

    /// Legt auf. Gibt `false` zurück, wenn kein Anruf offen war.
    pub fn end_call(&mut self) -> bool {
        if self.call.is_none() {
            return false;
        }

        if let Some(duration) = self.release_session(true) {
            tracing::info!("Call ended locally after {:.1}s", duration.as_secs_f32());
        }
        self.set_status(Status::call_ended());
        true
    }

    /// Kopiert die eigene ID in die Zwischenablage
    pub fn copy_agent_id(&self) -> Result<(), SessionError> {
        let Some(identity) = &self.identity else {
            return Err(self.fail(SessionError::NotInitialized));
        };

        self.clipboard
            .write_text(identity.as_str())
            .map_err(|e| self.fail(e.into()))?;

        tracing::info!("Agent ID {} copied to clipboard", identity);
        Ok(())
    }

    /// Beendet Anruf und Verbindung (idempotent)
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.release_session(true);
        self.peer_events = None;
        if let Some(peer) = self.peer.take() {
            peer.destroy();
        }

        tracing::info!("Session controller shut down");
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Wartet auf das nächste Event der Verbindung oder des aktiven Anrufs
    ///
    /// `None`, wenn es weder eine Verbindung noch einen Anruf gibt. Ein
    /// geschlossener Call-Channel wird als `Close` geliefert.
    pub async fn next_event(&mut self) -> Option<ControllerEvent<CallOf<T::Peer>>> {
        enum Outcome<C> {
            Peer(Option<PeerEvent<C>>),
            Call(Option<CallEvent>),
        }

        if self.peer_events.is_none() && self.call.is_none() {
            return None;
        }

        let outcome = {
            let peer_rx = self.peer_events.as_mut();
            let call_rx = self.call.as_mut().map(|call| &mut call.events);

            tokio::select! {
                biased;
                event = recv_or_pending(peer_rx) => Outcome::Peer(event),
                event = recv_or_pending(call_rx) => Outcome::Call(event),
            }
        };

        match outcome {
            Outcome::Peer(Some(event)) => Some(ControllerEvent::Peer(event)),
            Outcome::Peer(None) => {
                self.peer_events = None;
                Some(ControllerEvent::Peer(PeerEvent::Close))
            }
            Outcome::Call(Some(event)) => Some(ControllerEvent::Call(event)),
            Outcome::Call(None) => Some(ControllerEvent::Call(CallEvent::Close)),
        }
    }

    /// Wendet ein Event auf den Zustand an
    pub async fn handle_event(
        &mut self,
        event: ControllerEvent<CallOf<T::Peer>>,
    ) -> Result<(), SessionError> {
        match event {
            ControllerEvent::Peer(event) => self.handle_peer_event(event).await,
            ControllerEvent::Call(event) => self.handle_call_event(event),
        }
    }

    /// `next_event` + `handle_event`
    pub async fn process_next_event(&mut self) -> Option<Result<(), SessionError>> {
        let event = self.next_event().await?;
        Some(self.handle_event(event).await)
    }

    /// Treibt den Controller über einen Command-Channel
    ///
    /// Endet mit `Command::Shutdown` oder wenn alle Sender verworfen wurden.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        enum Step<E> {
            Command(Option<Command>),
            Event(Option<E>),
        }

        loop {
            let step = if self.peer_events.is_some() || self.call.is_some() {
                tokio::select! {
                    command = commands.recv() => Step::Command(command),
                    event = self.next_event() => Step::Event(event),
                }
            } else {
                Step::Command(commands.recv().await)
            };

            match step {
                Step::Command(None) | Step::Command(Some(Command::Shutdown)) => break,
                Step::Command(Some(command)) => {
                    if let Err(e) = self.execute(command).await {
                        log_failure("Command", &e);
                    }
                }
                Step::Event(Some(event)) => {
                    if let Err(e) = self.handle_event(event).await {
                        log_failure("Event", &e);
                    }
                }
                Step::Event(None) => {}
            }
        }

        self.shutdown();
    }

    async fn execute(&mut self, command: Command) -> Result<(), SessionError> {
        tracing::debug!("Command: {:?}", command);
        match command {
            Command::PlaceCall(remote_id) => self.place_call(&remote_id).await,
            Command::EndCall => {
                self.end_call();
                Ok(())
            }
            Command::CopyId => self.copy_agent_id(),
            Command::Shutdown => {
                self.shutdown();
                Ok(())
            }
        }
    }

    async fn handle_peer_event(
        &mut self,
        event: PeerEvent<CallOf<T::Peer>>,
    ) -> Result<(), SessionError> {
        match event {
            PeerEvent::Open(id) => {
                if self.reconnecting {
                    self.reconnecting = false;
                    tracing::info!("Reconnected to signaling as {}", id);
                    self.set_status(self.settled_status());
                } else {
                    tracing::info!("Connected to mesh as {}", id);
                    self.set_status(Status::ready(&id));
                }
                Ok(())
            }
            PeerEvent::Call(link) => {
                tracing::info!("Incoming call from {}", link.handle.remote_id());
                self.handle_incoming_call(link).await
            }
            PeerEvent::Disconnected => {
                if self.reconnecting {
                    tracing::debug!("Already reconnecting");
                    return Ok(());
                }
                self.reconnecting = true;
                let err = self.fail(SessionError::TransportDisconnected);

                if let Some(peer) = &self.peer {
                    if let Err(e) = peer.reconnect() {
                        self.reconnecting = false;
                        return Err(self.fail(SessionError::Transport(e.to_string())));
                    }
                }
                Err(err)
            }
            PeerEvent::Close => {
                if let Some(duration) = self.release_session(false) {
                    tracing::info!("Call dropped with connection after {:.1}s", duration.as_secs_f32());
                }
                self.peer = None;
                self.peer_events = None;
                self.reconnecting = false;
                Err(self.fail(SessionError::Transport("connection closed".to_string())))
            }
            PeerEvent::Error(message) => {
                if let Some(duration) = self.release_session(true) {
                    tracing::info!("Call aborted by transport error after {:.1}s", duration.as_secs_f32());
                }
                Err(self.fail(SessionError::Transport(message)))
            }
        }
    }

    fn handle_call_event(&mut self, event: CallEvent) -> Result<(), SessionError> {
        let Some(session) = self.call.as_mut() else {
            tracing::debug!("Ignoring call event without session: {:?}", event);
            return Ok(());
        };

        match event {
            CallEvent::Stream(remote) => {
                session.phase = CallPhase::Connected;
                let remote_id = session.remote_id.clone();

                if let Err(e) = self.media.attach_remote(remote) {
                    tracing::warn!("Remote playback unavailable: {}", e);
                }
                self.set_status(Status::in_call(&remote_id));
                Ok(())
            }
            CallEvent::Close => {
                if let Some(duration) = self.release_session(false) {
                    tracing::info!("Call closed after {:.1}s", duration.as_secs_f32());
                }
                self.set_status(Status::call_ended());
                Ok(())
            }
            CallEvent::Error(message) => {
                self.release_session(true);
                Err(self.fail(SessionError::Call(message)))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn open_session(
        &mut self,
        remote_id: &str,
        direction: CallDirection,
        phase: CallPhase,
        link: CallLink<CallOf<T::Peer>>,
    ) {
        tracing::info!("Call session with {} opened ({:?})", remote_id, direction);

        self.call = Some(CallSession {
            remote_id: remote_id.to_string(),
            direction,
            phase,
            handle: link.handle,
            events: link.events,
            opened_at: Instant::now(),
        });
        self.media.observe_mic_level();
    }

    /// Beendet die aktive Session und gibt die Media-Ressourcen frei
    ///
    /// Der Event-Receiver des Anrufs wird dabei verworfen.
    fn release_session(&mut self, close_handle: bool) -> Option<Duration> {
        let session = self.call.take();
        if close_handle {
            if let Some(session) = &session {
                session.handle.close();
            }
        }
        self.media.teardown();
        session.map(|session| session.duration())
    }

    /// Status nach erfolgreichem Reconnect
    fn settled_status(&self) -> Status {
        match &self.call {
            None => Status::reconnected(),
            Some(session) => match session.phase {
                CallPhase::Connected => Status::in_call(&session.remote_id),
                CallPhase::Dialing => Status::calling(&session.remote_id),
                CallPhase::Answering => Status::incoming(&session.remote_id),
            },
        }
    }

    fn set_status(&self, status: Status) {
        match status.kind {
            StatusKind::Error => tracing::warn!("Status: {}", status),
            _ => tracing::info!("Status: {}", status),
        }
        self.status_tx.send_replace(status);
    }

    /// Veröffentlicht den Fehler als Status und gibt ihn zurück
    fn fail(&self, err: SessionError) -> SessionError {
        self.set_status(Status::error(err.to_string()));
        err
    }
}

/// Fehler aus der Schleife in `run`: wiederholbare auf debug, sonst warn
fn log_failure(source: &str, err: &SessionError) {
    if err.is_retryable() {
        tracing::debug!("{} failed: {}", source, err);
    } else {
        tracing::warn!("{} failed: {}", source, err);
    }
}

impl<T: Transport> Drop for SessionController<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Transport> std::fmt::Debug for SessionController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("identity", &self.identity)
            .field("status", &self.status().kind)
            .field("remote", &self.active_remote())
            .field("reconnecting", &self.reconnecting)
            .finish()
    }
}

async fn recv_or_pending<E>(rx: Option<&mut mpsc::UnboundedReceiver<E>>) -> Option<E> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// TESTS
// ============================================================================
