use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::config::{ConnectConfig, KEEPALIVE_CHANNEL_LABEL};
use crate::error::{Error, ProtocolError, TransportError};
use crate::logger::{dump_candidate, dump_selected_pair, log};
use crate::media::{MediaConstraints, MediaSource};
use crate::peer::data_channel::{attach_keepalive, KeepaliveState};
use crate::peer::ice::wait_ice_complete;
use crate::peer::types::SignalingMessage;
use crate::session::Session;
use crate::signaling::{LinkEvent, SignalingLink};

/// Invoked once per remote media track received. The caller decides what to
/// do with repeated tracks; the core never touches UI state.
pub type OnRemoteTrack = Box<dyn Fn(Arc<TrackRemote>) + Send + Sync>;

enum RunEvent {
    Link(LinkEvent),
    PeerTerminal(RTCPeerConnectionState),
}

/// One peer session from connect to teardown.
///
/// An instance is built per connection attempt and never reused; a fresh
/// `connect` call is the only way to negotiate again, which is what keeps
/// one engine bound to at most one session.
pub struct ActiveConnection {
    session: Session,
    config: ConnectConfig,
    pc: Arc<RTCPeerConnection>,
    link: SignalingLink,
    media: Arc<dyn MediaSource>,
    keepalive: Arc<Mutex<KeepaliveState>>,
    terminal: mpsc::Receiver<RTCPeerConnectionState>,
}

impl ActiveConnection {
    /// Dial the relay and drive the whole offer side: local media, offer,
    /// ICE wait, transmission. On return the session awaits its answer;
    /// hand the connection to [`run`](Self::run) to finish negotiation.
    pub async fn connect(
        config: ConnectConfig,
        room_id: impl Into<String>,
        display_name: impl Into<String>,
        media: Arc<dyn MediaSource>,
        on_remote_track: OnRemoteTrack,
    ) -> Result<Self, Error> {
        let link = SignalingLink::open(&config.endpoint, || log("signaling link open")).await?;
        Self::connect_over(config, room_id, display_name, media, link, on_remote_track).await
    }

    /// Same flow over an already-open signaling link.
    pub async fn connect_over(
        config: ConnectConfig,
        room_id: impl Into<String>,
        display_name: impl Into<String>,
        media: Arc<dyn MediaSource>,
        link: SignalingLink,
        on_remote_track: OnRemoteTrack,
    ) -> Result<Self, Error> {
        let mut conn =
            Self::prepare(config, room_id, display_name, media, link, on_remote_track).await?;

        if let Err(e) = conn.negotiate().await {
            conn.close().await;
            return Err(e);
        }
        Ok(conn)
    }

    /// Build the peer connection, its diagnostic handlers, the keepalive
    /// channel and the remote-track forwarding, without negotiating yet.
    async fn prepare(
        config: ConnectConfig,
        room_id: impl Into<String>,
        display_name: impl Into<String>,
        media: Arc<dyn MediaSource>,
        link: SignalingLink,
        on_remote_track: OnRemoteTrack,
    ) -> Result<Self, Error> {
        let session = Session::new(room_id.into(), display_name.into());
        log(&format!(
            "[{}] joining room {} as {}",
            session.id, session.room_id, session.display_name
        ));

        let (pc, terminal) = new_peer(&config, &session.id).await?;

        // The data channel has to exist before the offer is built, even
        // though only the keepalive uses it: without a single m-line there
        // is nothing to gather ICE candidates for.
        let dc = pc
            .create_data_channel(
                KEEPALIVE_CHANNEL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await?;
        let keepalive = attach_keepalive(&dc);

        let session_tag = session.id.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                log(&format!(
                    "[{session_tag}] remote {:?} track arrived",
                    track.kind()
                ));
                on_remote_track(track.clone());
                Box::pin(async {})
            },
        ));

        Ok(Self {
            session,
            config,
            pc,
            link,
            media,
            keepalive,
            terminal,
        })
    }

    async fn negotiate(&mut self) -> Result<(), Error> {
        self.create_offer().await?;
        self.await_ice_gathering().await;
        self.send_offer().await
    }

    /// Acquire local capture, feed its tracks into the connection and
    /// commit the offer. Capture must have completed before the
    /// description is created; tracks added afterwards would not be
    /// reflected in it.
    pub async fn create_offer(&mut self) -> Result<(), Error> {
        let tracks = self.media.acquire(&MediaConstraints::default()).await?;
        for track in tracks {
            self.pc.add_track(track).await?;
        }

        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer).await?;
        let committed = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| webrtc::Error::new("no local description committed".to_owned()))?;
        self.session.offer_created(committed);
        Ok(())
    }

    /// Suspend until candidate collection is done, per the configured
    /// policy. Safe to call when gathering is already complete.
    pub async fn await_ice_gathering(&mut self) {
        self.session.gathering_started();
        wait_ice_complete(&self.pc, &self.config.gather).await;
    }

    /// Transmit the offer envelope. Only called once `await_ice_gathering`
    /// has resolved; a description with a partial candidate set must never
    /// leave this peer.
    pub async fn send_offer(&mut self) -> Result<(), Error> {
        // Re-read the committed description: by now it carries every
        // candidate collected since the offer was created.
        let desc = match self.pc.local_description().await {
            Some(desc) => desc,
            None => self
                .session
                .local_description()
                .cloned()
                .ok_or_else(|| webrtc::Error::new("offer was never committed".to_owned()))?,
        };

        let message = SignalingMessage {
            name: self.session.display_name.clone(),
            room_id: self.session.room_id.clone(),
            sdp: desc.sdp,
        };
        self.link.send(&message).await?;
        self.session.offer_sent();
        Ok(())
    }

    /// Apply a remote answer and finish negotiation. An answer with no
    /// outstanding offer is refused and leaves the remote description
    /// unset.
    pub async fn apply_remote_answer(&mut self, sdp: String) -> Result<(), Error> {
        if self.session.local_description().is_none() {
            return Err(Error::Protocol(ProtocolError::UnexpectedAnswer));
        }

        let answer = RTCSessionDescription::answer(sdp)?;
        self.pc.set_remote_description(answer.clone()).await?;
        self.session.answer_applied(answer)?;
        Ok(())
    }

    /// Consume inbound events until the session ends: answers are applied,
    /// anything terminal tears the session down. Resolves with the error
    /// that ended the session; the caller re-initiates with a fresh
    /// `connect` if it wants back in.
    pub async fn run(&mut self) -> Result<(), Error> {
        let result = loop {
            let event = tokio::select! {
                ev = self.link.recv() => RunEvent::Link(ev.unwrap_or(LinkEvent::Closed)),
                st = self.terminal.recv() => {
                    RunEvent::PeerTerminal(st.unwrap_or(RTCPeerConnectionState::Closed))
                }
            };

            match event {
                RunEvent::Link(LinkEvent::Answer { sdp }) => {
                    if let Err(e) = self.apply_remote_answer(sdp).await {
                        break Err(e);
                    }
                }
                RunEvent::Link(LinkEvent::Closed) => {
                    log(&format!("[{}] signaling link dropped", self.session.id));
                    break Err(Error::Transport(TransportError::LinkClosed));
                }
                RunEvent::PeerTerminal(state) => {
                    log(&format!(
                        "[{}] peer transport ended: {state:?}",
                        self.session.id
                    ));
                    break Err(Error::Transport(TransportError::LinkClosed));
                }
            }
        };

        self.close().await;
        result
    }

    /// Release the signaling transport, the peer connection and local
    /// capture together; leaving any of the three open would leak a
    /// socket or a live microphone.
    pub async fn close(&mut self) {
        self.link.close();
        if let Err(e) = self.pc.close().await {
            log(&format!("[{}] peer close failed: {e}", self.session.id));
        }
        self.media.release().await;
        self.session.closed();
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keepalive(&self) -> Arc<Mutex<KeepaliveState>> {
        self.keepalive.clone()
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

/// Build the API stack and a peer connection with its handlers wired:
/// candidate tracing, gathering-state tracing, and a terminal-state channel
/// the run loop listens on.
async fn new_peer(
    config: &ConnectConfig,
    session_id: &str,
) -> Result<(Arc<RTCPeerConnection>, mpsc::Receiver<RTCPeerConnectionState>), Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: config.ice_servers.clone(),
        ..Default::default()
    };
    let pc = Arc::new(api.new_peer_connection(rtc_config).await?);

    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand {
            Some(c) => dump_candidate("LOCAL", &c),
            // A null candidate marks the end of collection.
            None => log("ICE candidate collection finished"),
        }
        Box::pin(async {})
    }));

    pc.on_ice_gathering_state_change(Box::new(|state| {
        log(&format!("ICE gathering state changed to: {state:?}"));
        Box::pin(async {})
    }));

    let (terminal_tx, terminal_rx) = mpsc::channel(1);
    let sid = session_id.to_owned();
    let pc_state = pc.clone();
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        log(&format!("[{sid}] peer connection state: {st:?}"));
        match st {
            RTCPeerConnectionState::Connected => {
                let pc = pc_state.clone();
                tokio::spawn(async move {
                    dump_selected_pair(&pc, "CONNECTED").await;
                });
            }
            RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                let _ = terminal_tx.try_send(st);
            }
            _ => {}
        }
        Box::pin(async {})
    }));

    Ok((pc, terminal_rx))
}
