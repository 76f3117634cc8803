pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::ConnectConfig;
pub use error::{Error, MediaError, ProtocolError, Result, TransportError};
pub use media::{FileAudioSource, MediaConstraints, MediaSource};
pub use peer::{ActiveConnection, GatherPolicy, KeepaliveState, OnRemoteTrack, SignalingMessage};
pub use session::{Session, SessionPhase};
pub use signaling::{LinkEvent, SignalingLink};
