//! Agent Identity
//!
//! Erzeugt die prozessweite Adresse, unter der andere Peers diesen Agent
//! anrufen. Die ID wird einmal beim Start generiert und danach nie verändert.
//!
//! ## Verwendung
//! ```rust
//! use agentic_call::identity::AgentId;
//!
//! let id = AgentId::generate("agentic").unwrap();
//! assert!(id.as_str().starts_with("agentic-"));
//! ```

use chrono::Utc;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Standard-Präfix für generierte IDs
pub const DEFAULT_PREFIX: &str = "agentic";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentIdError {
    #[error("Invalid identity prefix: {0:?}")]
    InvalidPrefix(String),

    #[error("Malformed agent ID: {0:?}")]
    Malformed(String),
}

// ============================================================================
// AGENT ID
// ============================================================================

/// Lokale Agent-Adresse (`<prefix>-xxxx-xxxx`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Generiert eine neue ID mit dem gegebenen Präfix
    ///
    /// Die beiden Gruppen stammen aus dem OS-CSPRNG. Steht dieser nicht
    /// zur Verfügung, wird auf Zeitstempel + Thread-RNG zurückgefallen.
    pub fn generate(prefix: &str) -> Result<Self, AgentIdError> {
        if !is_valid_prefix(prefix) {
            return Err(AgentIdError::InvalidPrefix(prefix.to_string()));
        }

        let mut entropy = [0u8; 4];
        let (first, second) = match OsRng.try_fill_bytes(&mut entropy) {
            Ok(()) => hex_groups(entropy),
            Err(e) => {
                tracing::warn!("OS random source unavailable ({}), using fallback", e);
                fallback_groups()
            }
        };

        Ok(Self(format!("{}-{}-{}", prefix, first, second)))
    }

    /// Prüft eine fremde ID auf die generierte Form
    pub fn parse(value: &str) -> Result<Self, AgentIdError> {
        let malformed = || AgentIdError::Malformed(value.to_string());

        let mut groups = value.rsplitn(3, '-');
        let second = groups.next().ok_or_else(malformed)?;
        let first = groups.next().ok_or_else(malformed)?;
        let prefix = groups.next().ok_or_else(malformed)?;

        if !is_valid_prefix(prefix) || !is_hex_group(first) || !is_hex_group(second) {
            return Err(malformed());
        }
        Ok(Self(value.to_string()))
    }

    /// Gibt die ID als &str zurück
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Prüft ob ein Präfix als Adressbestandteil taugt
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !prefix.starts_with('-')
        && !prefix.ends_with('-')
}

fn is_hex_group(group: &str) -> bool {
    group.len() == 4 && group.chars().all(|c| c.is_ascii_hexdigit())
}

/// Zwei 4-stellige Hex-Gruppen aus 4 Zufallsbytes
fn hex_groups(bytes: [u8; 4]) -> (String, String) {
    (
        format!("{:02x}{:02x}", bytes[0], bytes[1]),
        format!("{:02x}{:02x}", bytes[2], bytes[3]),
    )
}

/// Zeitstempel (untere 16 Bit der Millisekunden) + Thread-RNG
fn fallback_groups() -> (String, String) {
    let millis = Utc::now().timestamp_millis() as u64;
    let noise: u16 = rand::thread_rng().gen();
    (format!("{:04x}", millis & 0xffff), format!("{:04x}", noise))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_shape() {
        let id = AgentId::generate(DEFAULT_PREFIX).unwrap();
        let parts: Vec<&str> = id.as_str().split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "agentic");
        assert!(is_hex_group(parts[1]));
        assert!(is_hex_group(parts[2]));
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = AgentId::generate(DEFAULT_PREFIX).unwrap();
        let b = AgentId::generate(DEFAULT_PREFIX).unwrap();
        // 32 Bit Zufall - eine Kollision ist hier praktisch ausgeschlossen
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_groups_are_zero_padded() {
        let (first, second) = hex_groups([0x0a, 0x01, 0x00, 0xff]);
        assert_eq!(first, "0a01");
        assert_eq!(second, "00ff");
    }

    #[test]
    fn test_fallback_groups_shape() {
        let (first, second) = fallback_groups();
        assert!(is_hex_group(&first));
        assert!(is_hex_group(&second));
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        assert_eq!(
            AgentId::generate(""),
            Err(AgentIdError::InvalidPrefix(String::new()))
        );
        assert!(AgentId::generate("bad prefix").is_err());
        assert!(AgentId::generate("-agent").is_err());
        assert!(AgentId::generate("agent_v2").is_ok());
    }

    #[test]
    fn test_parse_accepts_generated_shape() {
        let id = AgentId::generate("agent-v2").unwrap();
        assert_eq!(AgentId::parse(id.as_str()), Ok(id));
        assert!(AgentId::parse("agentic-ab12-cd34").is_ok());

        assert!(AgentId::parse("agentic-ab12").is_err());
        assert!(AgentId::parse("agentic-xyz1-cd34").is_err());
        assert!(AgentId::parse("-ab12-cd34").is_err());
        assert!(AgentId::parse("agentic-ab12-cd345").is_err());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = AgentId::generate("bot").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
