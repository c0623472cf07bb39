//! Transport Module - Mesh-Verbindung und Call-Signaling
//!
//! Dieses Modul beschreibt die Grenze zum Transport-Kollaborateur:
//! - Verbindung unter der eigenen Agent-ID öffnen
//! - Anrufe aufbauen, annehmen und schließen
//! - Events (open, call, disconnected, error) als Channel zustellen
//! - `LocalMesh` als In-Process-Implementierung
//!

mod events;
mod mesh;
mod options;
mod peer;

pub use events::{CallEvent, CallEvents, CallLink, PeerEvent, PeerEvents};
pub use mesh::{LocalMesh, MeshCall, MeshPeer};
pub use options::{default_ice_servers, IceServer, PeerOptions, DEFAULT_API_KEY, DEFAULT_SERVER};
pub use peer::{CallHandle, CallOf, PeerHandle, Transport, TransportError};
