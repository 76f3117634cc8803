use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, ProtocolError, TransportError};
use crate::logger::log;
use crate::peer::types::{InboundEnvelope, SignalingMessage};
use crate::utils::ws_endpoint;

/// What the relay can make happen on this side of the exchange. Offers only
/// flow outward; the sole recognized inbound message is the answer.
#[derive(Debug)]
pub enum LinkEvent {
    Answer { sdp: String },
    Closed,
}

/// Duplex message channel to the relay, one per peer session.
///
/// The socket is split into two pump tasks: outbound (queue -> sink) and
/// inbound (stream -> dispatch -> event queue). Session code never touches
/// the socket; it sends envelopes and drains `LinkEvent`s.
pub struct SignalingLink {
    outbound: Option<mpsc::Sender<String>>,
    events: mpsc::Receiver<LinkEvent>,
}

impl SignalingLink {
    /// Dial the relay. `on_open` runs exactly once, after the transport
    /// handshake has succeeded and before anything is sent.
    pub async fn open(endpoint: &str, on_open: impl FnOnce()) -> Result<Self, Error> {
        let (socket, _response) = connect_async(ws_endpoint(endpoint)).await?;
        on_open();

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(16);
        let (evt_tx, evt_rx) = mpsc::channel::<LinkEvent>(16);

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if sink.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(raw)) => {
                        if let Some(event) = dispatch(raw.as_str()) {
                            if evt_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log(&format!("signaling socket error: {e}"));
                        break;
                    }
                }
            }
            let _ = evt_tx.send(LinkEvent::Closed).await;
        });

        Ok(Self {
            outbound: Some(out_tx),
            events: evt_rx,
        })
    }

    /// Build the same link over a pre-established duplex text pair, for
    /// transports that are not WebSockets.
    pub fn over(outbound: mpsc::Sender<String>, mut raw_inbound: mpsc::Receiver<String>) -> Self {
        let (evt_tx, evt_rx) = mpsc::channel::<LinkEvent>(16);

        tokio::spawn(async move {
            while let Some(raw) = raw_inbound.recv().await {
                if let Some(event) = dispatch(&raw) {
                    if evt_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            let _ = evt_tx.send(LinkEvent::Closed).await;
        });

        Self {
            outbound: Some(outbound),
            events: evt_rx,
        }
    }

    /// Serialize and transmit one envelope. No acknowledgment is expected;
    /// delivery is the transport's business.
    pub async fn send(&self, message: &SignalingMessage) -> Result<(), Error> {
        let wire = serde_json::to_string(message)?;
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(TransportError::LinkClosed)?;
        outbound
            .send(wire)
            .await
            .map_err(|_| TransportError::LinkClosed)?;
        Ok(())
    }

    /// Next inbound event; `None` after the link has fully drained.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }

    /// Drop the outbound side, which lets the writer pump close the socket.
    pub fn close(&mut self) {
        self.outbound.take();
    }
}

/// Decode one raw frame. Malformed payloads are logged and dropped, the
/// session keeps running; unrecognized message types are ignored outright.
fn dispatch(raw: &str) -> Option<LinkEvent> {
    match parse(raw) {
        Ok(event) => event,
        Err(e) => {
            log(&format!("dropping inbound frame: {e}"));
            None
        }
    }
}

fn parse(raw: &str) -> Result<Option<LinkEvent>, Error> {
    let envelope: InboundEnvelope = serde_json::from_str(raw)?;
    match envelope.kind.as_deref() {
        Some("answer") => {
            let sdp = envelope.sdp.ok_or_else(|| {
                Error::Protocol(ProtocolError::MalformedMessage(
                    "answer without sdp".into(),
                ))
            })?;
            Ok(Some(LinkEvent::Answer { sdp }))
        }
        // Not a message for this role; offers never come back on our link.
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_answer_with_sdp() {
        let event = parse(r#"{"type":"answer","sdp":"v=0"}"#).unwrap();
        assert!(matches!(event, Some(LinkEvent::Answer { sdp }) if sdp == "v=0"));
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(parse("not json").is_err());
    }

    #[test]
    fn parse_rejects_answer_without_sdp() {
        let err = parse(r#"{"type":"answer"}"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn parse_ignores_other_message_types() {
        assert!(parse(r#"{"type":"roster","sdp":"x"}"#).unwrap().is_none());
        assert!(parse(r#"{"sdp":"x"}"#).unwrap().is_none());
    }

    #[tokio::test]
    async fn link_survives_malformed_frames() {
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (raw_tx, raw_rx) = mpsc::channel(16);
        let mut link = SignalingLink::over(out_tx, raw_rx);

        raw_tx.send("not json".to_string()).await.unwrap();
        raw_tx
            .send(r#"{"type":"answer","sdp":"v=0"}"#.to_string())
            .await
            .unwrap();

        // The malformed frame was swallowed; the answer still arrives.
        match link.recv().await {
            Some(LinkEvent::Answer { sdp }) => assert_eq!(sdp, "v=0"),
            other => panic!("expected answer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_the_raw_inbound_yields_closed() {
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (raw_tx, raw_rx) = mpsc::channel(16);
        let mut link = SignalingLink::over(out_tx, raw_rx);

        drop(raw_tx);
        assert!(matches!(link.recv().await, Some(LinkEvent::Closed)));
    }

    #[tokio::test]
    async fn send_serializes_the_offer_envelope() {
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (_raw_tx, raw_rx) = mpsc::channel(16);
        let link = SignalingLink::over(out_tx, raw_rx);

        link.send(&SignalingMessage {
            name: "Alice".into(),
            room_id: "1234".into(),
            sdp: "v=0".into(),
        })
        .await
        .unwrap();

        let wire = out_rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value["name"], "Alice");
        assert_eq!(value["roomId"], "1234");
        assert_eq!(value["sdp"], "v=0");
    }

    #[tokio::test]
    async fn send_after_close_is_link_closed() {
        let (out_tx, _out_rx) = mpsc::channel(16);
        let (_raw_tx, raw_rx) = mpsc::channel(16);
        let mut link = SignalingLink::over(out_tx, raw_rx);

        link.close();
        let err = link
            .send(&SignalingMessage {
                name: "Alice".into(),
                room_id: "1234".into(),
                sdp: "v=0".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::LinkClosed)
        ));
    }
}
