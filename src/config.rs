// Application configuration
// Logging can only be disabled in development builds

use std::time::Duration;

use webrtc::ice_transport::ice_server::RTCIceServer;

use crate::peer::ice::GatherPolicy;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

#[cfg(debug_assertions)]
pub mod dev {
    // Set to false to silence logging entirely during development.
    // Only honored in debug builds.
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Relay the signaling link dials when no endpoint override is given.
/// Room routing happens inside the message body, not in the address.
pub const SIGNALING_ENDPOINT: &str = "ws://localhost:8500";

/// How often the gathering state is re-checked while waiting for ICE.
pub const ICE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pause before answering an inbound keepalive payload.
pub const KEEPALIVE_REPLY_DELAY: Duration = Duration::from_millis(1000);

/// Label of the data channel carrying the keepalive exchange.
pub const KEEPALIVE_CHANNEL_LABEL: &str = "chat";

/// Per-connection settings. `Default` gives the fixed relay address, the
/// public STUN pair and the polling ICE wait.
#[derive(Clone)]
pub struct ConnectConfig {
    pub endpoint: String,
    pub ice_servers: Vec<RTCIceServer>,
    pub gather: GatherPolicy,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            endpoint: SIGNALING_ENDPOINT.to_owned(),
            ice_servers: default_ice_servers(),
            gather: GatherPolicy::default(),
        }
    }
}

pub fn default_ice_servers() -> Vec<RTCIceServer> {
    vec![RTCIceServer {
        urls: vec![
            "stun:stun.l.google.com:19302".into(),
            "stun:stun1.l.google.com:19302".into(),
        ],
        ..Default::default()
    }]
}
