use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::time::sleep;
use webrtc::data_channel::RTCDataChannel;

use crate::config::KEEPALIVE_REPLY_DELAY;
use crate::logger::log;

/// The liveness token. The same literal goes both directions; the reply is
/// not a distinct acknowledgment.
pub const PING: &[u8] = b"ping";

/// Observable side of the keepalive exchange. The timestamps are purely
/// diagnostic; nothing reads them to decide liveness.
#[derive(Debug, Default)]
pub struct KeepaliveState {
    pub channel_open: bool,
    pub last_ping_at: Option<DateTime<Local>>,
    pub last_pong_at: Option<DateTime<Local>>,
}

/// Wire the keepalive exchange onto a data channel. The channel handlers
/// only move payloads between queues; the protocol lives in
/// `keepalive_loop`, which starts once the channel opens.
pub fn attach_keepalive(dc: &Arc<RTCDataChannel>) -> Arc<Mutex<KeepaliveState>> {
    let state = Arc::new(Mutex::new(KeepaliveState::default()));

    let (in_tx, in_rx) = mpsc::channel::<Bytes>(8);
    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(8);

    dc.on_open(Box::new({
        let dc = dc.clone();
        let state = state.clone();
        move || {
            log(&format!("data channel '{}' open", dc.label()));
            state.lock().unwrap().channel_open = true;

            // Outbound pump: queue -> channel. Dies with the loop.
            tokio::spawn({
                let dc = dc.clone();
                async move {
                    while let Some(payload) = out_rx.recv().await {
                        if dc.send(&payload).await.is_err() {
                            break;
                        }
                    }
                }
            });
            tokio::spawn(keepalive_loop(in_rx, out_tx, state.clone()));
            Box::pin(async {})
        }
    }));

    dc.on_message(Box::new(move |msg| {
        let _ = in_tx.try_send(msg.data);
        Box::pin(async {})
    }));

    dc.on_close(Box::new({
        let state = state.clone();
        move || {
            log("data channel closed");
            state.lock().unwrap().channel_open = false;
            Box::pin(async {})
        }
    }));

    state
}

/// Ping on entry, then answer every inbound payload with another ping after
/// a fixed pause. Self-sustaining: it never ends on its own, only when a
/// queue side is dropped with the channel.
pub(crate) async fn keepalive_loop(
    mut inbound: mpsc::Receiver<Bytes>,
    outbound: mpsc::Sender<Bytes>,
    state: Arc<Mutex<KeepaliveState>>,
) {
    if outbound.send(Bytes::from_static(PING)).await.is_err() {
        return;
    }
    state.lock().unwrap().last_ping_at = Some(Local::now());

    while let Some(_payload) = inbound.recv().await {
        state.lock().unwrap().last_pong_at = Some(Local::now());
        sleep(KEEPALIVE_REPLY_DELAY).await;
        if outbound.send(Bytes::from_static(PING)).await.is_err() {
            break;
        }
        state.lock().unwrap().last_ping_at = Some(Local::now());
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{advance, timeout, Duration};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pings_immediately_on_start() {
        let (_in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let state = Arc::new(Mutex::new(KeepaliveState::default()));

        tokio::spawn(keepalive_loop(in_rx, out_tx, state.clone()));

        let first = out_rx.recv().await.unwrap();
        assert_eq!(&first[..], PING);
        assert!(state.lock().unwrap().last_ping_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn replies_ping_after_fixed_delay_indefinitely() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let state = Arc::new(Mutex::new(KeepaliveState::default()));

        tokio::spawn(keepalive_loop(in_rx, out_tx, state.clone()));
        assert_eq!(&out_rx.recv().await.unwrap()[..], PING);

        // Several rounds: each inbound payload is answered with "ping",
        // never a different token, and the exchange does not wind down.
        for _ in 0..3 {
            in_tx.send(Bytes::from_static(PING)).await.unwrap();

            // Nothing goes out before the reply delay has elapsed.
            advance(KEEPALIVE_REPLY_DELAY - Duration::from_millis(1)).await;
            assert!(out_rx.try_recv().is_err());

            advance(Duration::from_millis(1)).await;
            let reply = timeout(Duration::from_secs(1), out_rx.recv())
                .await
                .expect("keepalive reply due")
                .unwrap();
            assert_eq!(&reply[..], PING);
        }
        assert!(state.lock().unwrap().last_pong_at.is_some());
        assert!(!in_tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn any_payload_triggers_a_ping_reply() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let state = Arc::new(Mutex::new(KeepaliveState::default()));

        tokio::spawn(keepalive_loop(in_rx, out_tx, state));
        let _ = out_rx.recv().await;

        in_tx.send(Bytes::from_static(b"anything")).await.unwrap();
        advance(KEEPALIVE_REPLY_DELAY).await;
        assert_eq!(&out_rx.recv().await.unwrap()[..], PING);
    }
}
