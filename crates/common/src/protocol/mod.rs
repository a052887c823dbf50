// Wire protocol shared between the Coscribe server and its clients.

pub mod ws;

/// Protocol identifier clients present during the WebSocket handshake.
pub const SYNC_PROTOCOL: &str = "coscribe-sync.v1";
