//! Session Modul
//!
//! Zustandsmaschine eines Agents:
//! - `SessionController` besitzt Verbindung, Anruf und Media Pipeline
//! - `Status` ist das Modell, das die Darstellung rendert
//! - `Command` treibt den Controller über einen Channel (`run`)

mod controller;
mod error;
mod status;

pub use controller::{
    CallDirection, CallPhase, CallSession, Command, ControllerEvent, SessionConfig,
    SessionController,
};
pub use error::SessionError;
pub use status::{Status, StatusKind, CALL_ENDED};
