//! Verbindungsoptionen für den Mesh-Transport

use serde::{Deserialize, Serialize};
use url::Url;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Öffentlicher Signaling-Server
pub const DEFAULT_SERVER: &str = "https://0.peerjs.com/";

/// API-Key des öffentlichen Servers
pub const DEFAULT_API_KEY: &str = "peerjs";

// ============================================================================
// ICE SERVER CONFIGURATION
// ============================================================================

/// STUN/TURN Server Eintrag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Standard STUN Server Konfiguration
pub fn default_ice_servers() -> Vec<IceServer> {
    vec![
        // Google STUN Server (kostenlos, für ~90% der Verbindungen)
        IceServer {
            urls: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
                "stun:stun2.l.google.com:19302".to_string(),
            ],
            username: None,
            credential: None,
        },
    ]
}

// ============================================================================
// PEER OPTIONS
// ============================================================================

/// Optionen für `Transport::open`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerOptions {
    /// Signaling-Server
    pub server: Url,
    /// API-Key für den Server
    pub key: String,
    pub ice_servers: Vec<IceServer>,
    /// Log-Level des Transports (0-3)
    pub debug: u8,
}

impl PeerOptions {
    /// Fügt einen TURN-Server hinzu
    pub fn with_turn_server(mut self, url: String, username: String, credential: String) -> Self {
        self.ice_servers.push(IceServer {
            urls: vec![url],
            username: Some(username),
            credential: Some(credential),
        });
        self
    }
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            server: Url::parse(DEFAULT_SERVER).expect("default server URL is valid"),
            key: DEFAULT_API_KEY.to_string(),
            ice_servers: default_ice_servers(),
            debug: 0,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PeerOptions::default();
        assert_eq!(options.server.host_str(), Some("0.peerjs.com"));
        assert_eq!(options.key, "peerjs");
        assert_eq!(options.ice_servers.len(), 1);
        assert_eq!(options.ice_servers[0].urls.len(), 3);
    }

    #[test]
    fn test_turn_server_appended() {
        let options = PeerOptions::default().with_turn_server(
            "turn:turn.example.org:3478".to_string(),
            "agent".to_string(),
            "secret".to_string(),
        );
        let turn = options.ice_servers.last().unwrap();
        assert_eq!(turn.username.as_deref(), Some("agent"));
        assert_eq!(turn.credential.as_deref(), Some("secret"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: PeerOptions =
            serde_json::from_str(r#"{ "server": "wss://mesh.example.org/signal", "debug": 2 }"#)
                .unwrap();
        assert_eq!(options.server.scheme(), "wss");
        assert_eq!(options.debug, 2);
        assert_eq!(options.key, DEFAULT_API_KEY);
        assert_eq!(options.ice_servers, default_ice_servers());
    }
}
