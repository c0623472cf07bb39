//! In-Process Mesh
//!
//! Broker, der mehrere Agents im selben Prozess miteinander verbindet.
//! Events werden wie beim echten Transport asynchron über Channels
//! zugestellt. Zusätzlich gibt es Hooks, um Netzwerkprobleme zu simulieren,
//! und Zähler für Tests und Demos.

use super::events::{CallEvent, CallLink, PeerEvent, PeerEvents};
use super::options::PeerOptions;
use super::peer::{CallHandle, PeerHandle, Transport, TransportError};
use crate::identity::AgentId;
use crate::media::MediaStream;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

// ============================================================================
// MESH STATE
// ============================================================================

struct PeerSlot {
    events: mpsc::UnboundedSender<PeerEvent<MeshCall>>,
    online: bool,
}

struct CallSlot {
    caller: String,
    callee: String,
    caller_tx: mpsc::UnboundedSender<CallEvent>,
    callee_tx: mpsc::UnboundedSender<CallEvent>,
    /// Stream des Anrufers, wird dem Angerufenen beim Annehmen zugestellt
    offer: MediaStream,
    answered: bool,
}

impl CallSlot {
    fn involves(&self, peer_id: &str) -> bool {
        self.caller == peer_id || self.callee == peer_id
    }

    fn notify_both(&self, event: CallEvent) {
        let _ = self.caller_tx.send(event.clone());
        let _ = self.callee_tx.send(event);
    }
}

#[derive(Default)]
struct MeshState {
    peers: HashMap<String, PeerSlot>,
    calls: HashMap<Uuid, CallSlot>,
    /// Alle je aufgebauten Anrufe (call_id, caller, callee)
    call_log: Vec<(Uuid, String, String)>,
    calls_placed: usize,
    close_requests: HashMap<Uuid, usize>,
    reconnect_requests: HashMap<String, usize>,
}

// ============================================================================
// LOCAL MESH
// ============================================================================

/// In-Process Transport
///
/// Führt über jeden Anruf Buch (`calls_between`, `close_requests`). Diese
/// Historie wächst mit jedem Anruf und wird nur durch `clear_history`
/// geleert, offene Anrufe sind davon nicht betroffen.
#[derive(Clone, Default)]
pub struct LocalMesh {
    state: Arc<Mutex<MeshState>>,
}

impl LocalMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simuliert den Verlust der Signaling-Verbindung
    ///
    /// Laufende Anrufe bleiben bestehen, neue Anrufe schlagen fehl.
    pub fn disconnect(&self, peer_id: &str) -> bool {
        let mut state = self.state.lock();
        match state.peers.get_mut(peer_id) {
            Some(slot) if slot.online => {
                slot.online = false;
                let _ = slot.events.send(PeerEvent::Disconnected);
                tracing::debug!("Mesh: {} disconnected", peer_id);
                true
            }
            _ => false,
        }
    }

    /// Meldet einen Fehler auf der Verbindung eines Peers
    pub fn report_error(&self, peer_id: &str, message: &str) -> bool {
        let state = self.state.lock();
        match state.peers.get(peer_id) {
            Some(slot) => slot
                .events
                .send(PeerEvent::Error(message.to_string()))
                .is_ok(),
            None => false,
        }
    }

    /// Lässt den laufenden Anruf eines Peers mit einem Fehler scheitern
    pub fn fail_call(&self, peer_id: &str, message: &str) -> bool {
        let mut state = self.state.lock();
        let call_id = state
            .calls
            .iter()
            .find(|(_, slot)| slot.involves(peer_id))
            .map(|(id, _)| *id);

        match call_id.and_then(|id| state.calls.remove(&id)) {
            Some(slot) => {
                slot.notify_both(CallEvent::Error(message.to_string()));
                true
            }
            None => false,
        }
    }

    /// Anzahl der `call`-Aufrufe über alle Peers
    pub fn calls_placed(&self) -> usize {
        self.state.lock().calls_placed
    }

    /// IDs aller Anrufe von `caller` an `callee` in Reihenfolge
    pub fn calls_between(&self, caller: &str, callee: &str) -> Vec<Uuid> {
        self.state
            .lock()
            .call_log
            .iter()
            .filter(|(_, from, to)| from == caller && to == callee)
            .map(|(id, _, _)| *id)
            .collect()
    }

    /// Wie oft `close` auf einem Anruf aufgerufen wurde
    pub fn close_requests(&self, call_id: &Uuid) -> usize {
        self.state
            .lock()
            .close_requests
            .get(call_id)
            .copied()
            .unwrap_or(0)
    }

    /// Wie oft ein Peer `reconnect` aufgerufen hat
    pub fn reconnect_requests(&self, peer_id: &str) -> usize {
        self.state
            .lock()
            .reconnect_requests
            .get(peer_id)
            .copied()
            .unwrap_or(0)
    }

    /// Prüft ob ein Peer registriert und mit dem Signaling verbunden ist
    pub fn is_online(&self, peer_id: &str) -> bool {
        self.state
            .lock()
            .peers
            .get(peer_id)
            .map(|slot| slot.online)
            .unwrap_or(false)
    }

    /// Anzahl der offenen Anrufe
    pub fn active_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Verwirft die Historie abgeschlossener Anrufe
    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        let MeshState {
            calls,
            call_log,
            close_requests,
            ..
        } = &mut *state;

        call_log.retain(|(id, _, _)| calls.contains_key(id));
        close_requests.retain(|id, _| calls.contains_key(id));
    }
}

impl fmt::Debug for LocalMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LocalMesh")
            .field("peers", &state.peers.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

#[async_trait]
impl Transport for LocalMesh {
    type Peer = MeshPeer;

    async fn open(
        &self,
        id: &AgentId,
        options: &PeerOptions,
    ) -> Result<(MeshPeer, PeerEvents<MeshCall>), TransportError> {
        let mut state = self.state.lock();

        if state.peers.contains_key(id.as_str()) {
            return Err(TransportError::IdTaken(id.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(PeerEvent::Open(id.to_string()));
        state.peers.insert(
            id.to_string(),
            PeerSlot {
                events: tx,
                online: true,
            },
        );

        tracing::debug!("Mesh: {} registered (server {})", id, options.server);

        Ok((
            MeshPeer {
                id: id.to_string(),
                mesh: self.clone(),
                destroyed: AtomicBool::new(false),
            },
            rx,
        ))
    }
}

// ============================================================================
// MESH PEER
// ============================================================================

/// Verbindung eines Agents zum `LocalMesh`
pub struct MeshPeer {
    id: String,
    mesh: LocalMesh,
    destroyed: AtomicBool,
}

impl fmt::Debug for MeshPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshPeer")
            .field("id", &self.id)
            .field("destroyed", &self.destroyed.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl PeerHandle for MeshPeer {
    type Call = MeshCall;

    fn id(&self) -> &str {
        &self.id
    }

    async fn call(
        &self,
        remote_id: &str,
        stream: &MediaStream,
    ) -> Result<CallLink<MeshCall>, TransportError> {
        let mut state = self.mesh.state.lock();
        state.calls_placed += 1;

        if self.destroyed.load(Ordering::SeqCst) {
            return Err(TransportError::Destroyed);
        }

        match state.peers.get(&self.id) {
            Some(slot) if slot.online => {}
            _ => return Err(TransportError::Disconnected),
        }

        if remote_id == self.id {
            return Err(TransportError::PeerUnavailable(remote_id.to_string()));
        }

        let callee = match state.peers.get(remote_id) {
            Some(slot) if slot.online => slot,
            _ => return Err(TransportError::PeerUnavailable(remote_id.to_string())),
        };

        let call_id = Uuid::new_v4();
        let (caller_tx, caller_rx) = mpsc::unbounded_channel();
        let (callee_tx, callee_rx) = mpsc::unbounded_channel();
        let weak = Arc::downgrade(&self.mesh.state);

        let inbound = MeshCall {
            call_id,
            local_id: remote_id.to_string(),
            remote_id: self.id.clone(),
            state: weak.clone(),
        };

        callee
            .events
            .send(PeerEvent::Call(CallLink {
                handle: inbound,
                events: callee_rx,
            }))
            .map_err(|_| TransportError::PeerUnavailable(remote_id.to_string()))?;

        state.calls.insert(
            call_id,
            CallSlot {
                caller: self.id.clone(),
                callee: remote_id.to_string(),
                caller_tx,
                callee_tx,
                offer: stream.clone(),
                answered: false,
            },
        );
        state
            .call_log
            .push((call_id, self.id.clone(), remote_id.to_string()));

        tracing::debug!("Mesh: call {} from {} to {}", call_id, self.id, remote_id);

        Ok(CallLink {
            handle: MeshCall {
                call_id,
                local_id: self.id.clone(),
                remote_id: remote_id.to_string(),
                state: weak,
            },
            events: caller_rx,
        })
    }

    fn reconnect(&self) -> Result<(), TransportError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(TransportError::Destroyed);
        }

        let mut state = self.mesh.state.lock();
        *state.reconnect_requests.entry(self.id.clone()).or_insert(0) += 1;

        let slot = state
            .peers
            .get_mut(&self.id)
            .ok_or(TransportError::Destroyed)?;

        if slot.online {
            tracing::debug!("Mesh: {} is already connected", self.id);
            return Ok(());
        }

        slot.online = true;
        let _ = slot.events.send(PeerEvent::Open(self.id.clone()));
        Ok(())
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut state = self.mesh.state.lock();

        let ended: Vec<Uuid> = state
            .calls
            .iter()
            .filter(|(_, slot)| slot.involves(&self.id))
            .map(|(id, _)| *id)
            .collect();
        for call_id in ended {
            if let Some(slot) = state.calls.remove(&call_id) {
                slot.notify_both(CallEvent::Close);
            }
        }

        if let Some(slot) = state.peers.remove(&self.id) {
            let _ = slot.events.send(PeerEvent::Close);
        }

        tracing::debug!("Mesh: {} destroyed", self.id);
    }
}

// ============================================================================
// MESH CALL
// ============================================================================

/// Ein Anruf im `LocalMesh` (aus Sicht einer Seite)
#[derive(Clone)]
pub struct MeshCall {
    call_id: Uuid,
    local_id: String,
    remote_id: String,
    state: Weak<Mutex<MeshState>>,
}

impl MeshCall {
    pub fn call_id(&self) -> Uuid {
        self.call_id
    }
}

impl fmt::Debug for MeshCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshCall")
            .field("call_id", &self.call_id)
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id)
            .finish()
    }
}

#[async_trait]
impl CallHandle for MeshCall {
    fn remote_id(&self) -> &str {
        &self.remote_id
    }

    async fn answer(&self, stream: &MediaStream) -> Result<(), TransportError> {
        let state = self
            .state
            .upgrade()
            .ok_or_else(|| TransportError::CallClosed(self.remote_id.clone()))?;
        let mut state = state.lock();

        let slot = state
            .calls
            .get_mut(&self.call_id)
            .ok_or_else(|| TransportError::CallClosed(self.remote_id.clone()))?;

        if slot.callee != self.local_id {
            return Err(TransportError::Network(
                "only the called peer can answer".to_string(),
            ));
        }
        if slot.answered {
            return Ok(());
        }

        slot.answered = true;
        let _ = slot.caller_tx.send(CallEvent::Stream(stream.clone()));
        let _ = slot.callee_tx.send(CallEvent::Stream(slot.offer.clone()));

        tracing::debug!("Mesh: call {} answered by {}", self.call_id, self.local_id);
        Ok(())
    }

    fn close(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.lock();
        *state.close_requests.entry(self.call_id).or_insert(0) += 1;

        if let Some(slot) = state.calls.remove(&self.call_id) {
            slot.notify_both(CallEvent::Close);
            tracing::debug!("Mesh: call {} closed by {}", self.call_id, self.local_id);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
