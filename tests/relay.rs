//! Full offer/answer flow against an in-process WebSocket relay.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::interceptor::registry::Registry;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use vokal::{
    ActiveConnection, ConnectConfig, Error, GatherPolicy, MediaConstraints, MediaSource,
    SessionPhase, TransportError,
};

struct MockMicrophone;

#[async_trait]
impl MediaSource for MockMicrophone {
    async fn acquire(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<Vec<Arc<dyn TrackLocal + Send + Sync>>, Error> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "mock-mic".to_owned(),
        ));
        Ok(vec![track as Arc<dyn TrackLocal + Send + Sync>])
    }

    async fn release(&self) {}
}

/// Answering side, in-process: consume the offer SDP, produce an answer.
async fn answer_for(offer_sdp: String) -> String {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().unwrap();
    let registry = register_default_interceptors(Registry::new(), &mut media_engine).unwrap();
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();
    let pc = api
        .new_peer_connection(RTCConfiguration::default())
        .await
        .unwrap();

    pc.set_remote_description(RTCSessionDescription::offer(offer_sdp).unwrap())
        .await
        .unwrap();
    let answer = pc.create_answer(None).await.unwrap();
    pc.set_local_description(answer).await.unwrap();
    pc.local_description().await.unwrap().sdp
}

#[tokio::test]
async fn negotiates_through_a_websocket_relay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // One-shot relay: accept the peer, check the offer envelope, reply with
    // an answer envelope, then drop the socket.
    let relay = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();

        let frame = socket.next().await.unwrap().unwrap();
        let offer: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(offer["roomId"], "1234");
        assert_eq!(offer["name"], "Alice");
        let offer_sdp = offer["sdp"].as_str().unwrap().to_owned();
        assert!(!offer_sdp.is_empty());

        let answer_sdp = answer_for(offer_sdp).await;
        socket
            .send(Message::text(
                serde_json::json!({ "type": "answer", "sdp": answer_sdp }).to_string(),
            ))
            .await
            .unwrap();
        socket.close(None).await.ok();
    });

    let config = ConnectConfig {
        endpoint: format!("ws://{addr}"),
        ice_servers: Vec::new(),
        gather: GatherPolicy::Subscribe,
    };
    let mut conn = ActiveConnection::connect(
        config,
        "1234",
        "Alice",
        Arc::new(MockMicrophone),
        Box::new(|_| {}),
    )
    .await
    .unwrap();
    assert_eq!(conn.session().phase(), SessionPhase::AwaitingAnswer);

    // The relay answers and then drops the link, so the run loop first
    // connects the session and then winds it down.
    let err = conn.run().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(TransportError::LinkClosed)
    ));
    assert!(conn.session().remote_description().is_some());
    assert_eq!(conn.session().phase(), SessionPhase::Closed);

    relay.await.unwrap();
}
