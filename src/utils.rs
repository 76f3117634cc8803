use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Promote a bare host:port to a WebSocket URL, leaving full URLs alone.
pub fn ws_endpoint(addr: &str) -> String {
    if addr.starts_with("ws://") || addr.starts_with("wss://") {
        addr.to_owned()
    } else {
        format!("ws://{addr}")
    }
}
