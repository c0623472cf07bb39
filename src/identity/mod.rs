//! Identity Module - Agent-Adressen
//!
//! Dieses Modul erzeugt die lokale Identität des Agents:
//! - Präfix plus zwei 4-stellige Hex-Gruppen (`agentic-ab12-cd34`)
//! - Zufall aus dem OS-CSPRNG, Fallback auf Zeitstempel + Zufall
//!

mod agent_id;

pub use agent_id::{is_valid_prefix, AgentId, AgentIdError, DEFAULT_PREFIX};
