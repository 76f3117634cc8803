use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::error::{Error, ProtocolError};
use crate::logger::log;
use crate::utils::random_id;

/// Where a session currently stands. A session is single-use: phases only
/// move forward, and `Closed` is terminal from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Offering,
    IceGathering,
    AwaitingAnswer,
    Connected,
    Closed,
}

/// One negotiation attempt for one room. Mutated only through the named
/// transitions below; the ICE and signaling states live on the underlying
/// peer connection and are not duplicated here.
pub struct Session {
    pub room_id: String,
    pub display_name: String,
    pub id: String,
    local_description: Option<RTCSessionDescription>,
    remote_description: Option<RTCSessionDescription>,
    phase: SessionPhase,
}

impl Session {
    pub fn new(room_id: String, display_name: String) -> Self {
        Self {
            room_id,
            display_name,
            id: random_id(),
            local_description: None,
            remote_description: None,
            phase: SessionPhase::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn local_description(&self) -> Option<&RTCSessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&RTCSessionDescription> {
        self.remote_description.as_ref()
    }

    /// The offer is built and committed on the peer connection.
    pub fn offer_created(&mut self, desc: RTCSessionDescription) {
        self.local_description = Some(desc);
        self.phase = SessionPhase::Offering;
        log(&format!("[{}] offer committed", self.id));
    }

    /// Candidate collection started; the session blocks here.
    pub fn gathering_started(&mut self) {
        self.phase = SessionPhase::IceGathering;
    }

    /// The offer left over the signaling link.
    pub fn offer_sent(&mut self) {
        self.phase = SessionPhase::AwaitingAnswer;
        log(&format!("[{}] offer sent, waiting for answer", self.id));
    }

    /// A remote answer was applied. Refused when no offer was ever
    /// committed: an answer without an outstanding offer is a protocol
    /// violation, and the remote description stays unset.
    pub fn answer_applied(&mut self, desc: RTCSessionDescription) -> Result<(), Error> {
        if self.local_description.is_none() {
            return Err(Error::Protocol(ProtocolError::UnexpectedAnswer));
        }
        self.remote_description = Some(desc);
        self.phase = SessionPhase::Connected;
        log(&format!("[{}] answer applied, session connected", self.id));
        Ok(())
    }

    /// Terminal. Reachable from any phase on teardown or transport loss.
    pub fn closed(&mut self) {
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Closed;
            log(&format!("[{}] session closed", self.id));
        }
    }
}
