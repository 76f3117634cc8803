pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod types;

pub use connection::{ActiveConnection, OnRemoteTrack};
pub use data_channel::KeepaliveState;
pub use ice::GatherPolicy;
pub use types::SignalingMessage;
