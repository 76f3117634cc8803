use thiserror::Error;

/// Failures of the local media collaborator.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Capture was refused or the device is unavailable. Fatal to the
    /// session; the caller has to start over.
    #[error("media capture denied: {0}")]
    AcquisitionDenied(String),
}

/// Violations of the offer/answer exchange.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound signaling payload that could not be parsed or is missing a
    /// required field. Logged and dropped; the session keeps running.
    #[error("malformed signaling message: {0}")]
    MalformedMessage(String),

    /// An answer arrived while no offer was outstanding. Fatal.
    #[error("answer received with no outstanding offer")]
    UnexpectedAnswer,
}

/// Failures of the signaling transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The link to the relay dropped. Fatal; there is no auto-reconnect.
    #[error("signaling link closed")]
    LinkClosed,

    /// The WebSocket handshake or a frame-level operation failed.
    #[error("websocket failure: {0}")]
    Socket(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Rtc(#[from] webrtc::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(ProtocolError::MalformedMessage(err.to_string()))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(TransportError::Socket(err.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
