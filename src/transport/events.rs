//! Events des Transport-Kollaborateurs
//!
//! Jede Verbindung und jeder Anruf liefert seine Events über einen eigenen
//! Channel. Wer den Receiver droppt, beendet damit die Subscription.

use crate::media::MediaStream;
use tokio::sync::mpsc;

/// Events einer Mesh-Verbindung
#[derive(Debug)]
pub enum PeerEvent<C> {
    /// Verbindung ist unter der ID adressierbar
    Open(String),
    /// Eingehender Anruf
    Call(CallLink<C>),
    /// Verbindung zum Signaling-Server verloren (Anrufe laufen weiter)
    Disconnected,
    /// Verbindung wurde endgültig geschlossen
    Close,
    /// Fehler vom Transport
    Error(String),
}

/// Events eines einzelnen Anrufs
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Remote-Stream ist angekommen
    Stream(MediaStream),
    /// Anruf beendet (von einer Seite oder vom Netzwerk)
    Close,
    /// Fehler im Anruf
    Error(String),
}

pub type PeerEvents<C> = mpsc::UnboundedReceiver<PeerEvent<C>>;
pub type CallEvents = mpsc::UnboundedReceiver<CallEvent>;

/// Call-Handle zusammen mit seinem Event-Receiver
#[derive(Debug)]
pub struct CallLink<C> {
    pub handle: C,
    pub events: CallEvents,
}
